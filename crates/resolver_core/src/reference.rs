//! Registry references: canonical ids and caller shorthand.
//!
//! Grammar:
//!   canonical  := "registry/" Type "/" name [ "@" version ]
//!   shorthand  := [ type_hint ":" ] name "@" major "." minor [ "." patch ]
//!
//! Shorthand must always carry a version, even for un-versioned types whose
//! canonical id drops it.

use std::fmt;

use crate::error::ResolverError;

pub const REGISTRY_PREFIX: &str = "registry/";

/// Registry type directories a reference can resolve into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryType {
    EventSchema,
    EnvelopeSchema,
    Capability,
    ToolContract,
    SchemaBundle,
}

impl RegistryType {
    pub const ALL: [RegistryType; 5] = [
        RegistryType::EventSchema,
        RegistryType::EnvelopeSchema,
        RegistryType::Capability,
        RegistryType::ToolContract,
        RegistryType::SchemaBundle,
    ];

    pub fn dir(&self) -> &'static str {
        match self {
            RegistryType::EventSchema => "Event_Schema",
            RegistryType::EnvelopeSchema => "Envelope_Schema",
            RegistryType::Capability => "Capability",
            RegistryType::ToolContract => "Tool_Contract",
            RegistryType::SchemaBundle => "Schema_Bundle",
        }
    }

    /// Capabilities and tool contracts are addressed without a version.
    pub fn is_versioned(&self) -> bool {
        !matches!(self, RegistryType::Capability | RegistryType::ToolContract)
    }

    pub fn from_dir(dir: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.dir() == dir)
    }

    /// Map a shorthand type hint (case-insensitive) to its directory.
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.to_ascii_lowercase().as_str() {
            "event" | "event_schema" => Some(RegistryType::EventSchema),
            "envelope" | "envelope_schema" => Some(RegistryType::EnvelopeSchema),
            "capability" => Some(RegistryType::Capability),
            "tool" | "tool_contract" => Some(RegistryType::ToolContract),
            "bundle" | "schema_bundle" => Some(RegistryType::SchemaBundle),
            _ => None,
        }
    }
}

/// A fully-qualified registry node id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalId {
    pub registry_type: RegistryType,
    pub name: String,
    pub version: Option<String>,
}

impl CanonicalId {
    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}/{}",
            REGISTRY_PREFIX,
            self.registry_type.dir(),
            self.name
        )?;
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        Ok(())
    }
}

/// Turn a canonical id or a shorthand reference into a [`CanonicalId`].
pub fn canonicalize(reference: &str) -> Result<CanonicalId, ResolverError> {
    let reference = reference.trim();
    if let Some(rest) = reference.strip_prefix(REGISTRY_PREFIX) {
        return parse_canonical(reference, rest);
    }
    parse_shorthand(reference)
}

fn parse_canonical(full: &str, rest: &str) -> Result<CanonicalId, ResolverError> {
    let (dir, tail) = rest
        .split_once('/')
        .ok_or_else(|| ResolverError::Resolution(format!("malformed canonical id '{full}'")))?;
    let registry_type = RegistryType::from_dir(dir).ok_or_else(|| {
        ResolverError::Resolution(format!("unknown registry type '{dir}' in '{full}'"))
    })?;
    let (name, version) = match tail.rsplit_once('@') {
        Some((name, version)) => (name, Some(version)),
        None => (tail, None),
    };
    if name.is_empty() || name.contains('/') || version.is_some_and(str::is_empty) {
        return Err(ResolverError::Resolution(format!(
            "malformed canonical id '{full}'"
        )));
    }
    Ok(CanonicalId {
        registry_type,
        name: name.to_string(),
        version: version.map(str::to_string),
    })
}

fn parse_shorthand(reference: &str) -> Result<CanonicalId, ResolverError> {
    let (prefix, version) = reference.rsplit_once('@').ok_or_else(|| {
        ResolverError::VersionRequired(format!(
            "'{reference}' must include @major.minor (e.g., membrane.inject@1.1)"
        ))
    })?;
    if !is_well_formed_version(version) {
        return Err(ResolverError::VersionRequired(format!(
            "'{reference}' has malformed version '{version}'; expected @major.minor[.patch]"
        )));
    }

    let (hint, name) = match prefix.split_once(':') {
        Some((hint, name)) => (hint, name),
        None => ("event", prefix),
    };
    let registry_type = RegistryType::from_hint(hint).ok_or_else(|| {
        ResolverError::Resolution(format!(
            "unknown reference prefix '{hint}' for '{reference}'"
        ))
    })?;
    if name.is_empty() || name.contains('/') {
        return Err(ResolverError::Resolution(format!(
            "'{reference}' has an empty or malformed name"
        )));
    }

    Ok(CanonicalId {
        registry_type,
        name: name.to_string(),
        version: registry_type
            .is_versioned()
            .then(|| version.to_string()),
    })
}

fn is_well_formed_version(version: &str) -> bool {
    let segments: Vec<&str> = version.split('.').collect();
    (2..=3).contains(&segments.len())
        && segments
            .iter()
            .all(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
}

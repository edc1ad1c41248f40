//! SchemaResolver: registry reference resolution with positive and negative
//! caching and compatibility-graph lookups.
//!
//! Takes its ports via `Arc<dyn _>`; each instance owns its caches. Resolution
//! errors (`VersionRequired`, `NotFound`, `Resolution`) go straight back to the
//! caller and nothing here retries.

pub mod compat;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::error::ResolverError;
use crate::ports::{query_with_timeout, GraphQuery, GraphQueryPort, Result, Row};
use crate::reference::{canonicalize, RegistryType};
use crate::telemetry::{TelemetryEvent, TelemetryKind, TelemetrySink};
use crate::value::PropValue;
use crate::version::{select_latest, Version};

pub use compat::{CompatBuckets, CompatibilityEdge, EdgeDirection, COMPAT_RELATIONS};

/// Label every registry node carries; stripped from [`RegistryNode::labels`].
pub const NODE_LABEL: &str = "RegistryNode";

const NODE_BY_ID: &str = "
MATCH (n:RegistryNode {id: $id})
RETURN properties(n) AS props, labels(n) AS labels
";

const NODES_BY_TYPE_AND_NAME: &str = "
MATCH (n:RegistryNode)
WHERE $type_name IN labels(n) AND n.name = $name
RETURN n.id AS id, n.version AS version
";

// ── Configuration ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SchemaResolverConfig {
    pub positive_ttl: Duration,
    pub negative_ttl: Duration,
    pub query_timeout: Duration,
    /// Graph to query; `None` uses the adapter default.
    pub graph: Option<String>,
}

impl Default for SchemaResolverConfig {
    fn default() -> Self {
        Self {
            positive_ttl: Duration::from_secs(60),
            negative_ttl: Duration::from_secs(10),
            query_timeout: Duration::from_secs(10),
            graph: None,
        }
    }
}

impl SchemaResolverConfig {
    pub fn with_positive_ttl(mut self, ttl: Duration) -> Self {
        self.positive_ttl = ttl;
        self
    }

    pub fn with_negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = ttl;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_graph(mut self, graph: impl Into<String>) -> Self {
        self.graph = Some(graph.into());
        self
    }
}

// ── RegistryNode ──────────────────────────────────────────────

/// A resolved registry node. Read-only copy of what the store holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryNode {
    pub id: String,
    pub type_name: String,
    pub name: String,
    pub version: Option<String>,
    pub labels: BTreeSet<String>,
    pub properties: BTreeMap<String, PropValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compat: Option<CompatBuckets>,
}

/// Who asked, for telemetry attribution.
#[derive(Debug, Clone, Copy, Default)]
pub struct Attribution<'a> {
    pub caller: Option<&'a str>,
    pub org: Option<&'a str>,
}

impl<'a> Attribution<'a> {
    pub fn new(caller: Option<&'a str>, org: Option<&'a str>) -> Self {
        Self { caller, org }
    }
}

// ── SchemaResolver ────────────────────────────────────────────

pub struct SchemaResolver {
    graph: Arc<dyn GraphQueryPort>,
    telemetry: Arc<dyn TelemetrySink>,
    config: SchemaResolverConfig,
    positive: TtlCache<RegistryNode>,
    negative: TtlCache<()>,
    compat: TtlCache<CompatBuckets>,
}

impl SchemaResolver {
    pub fn new(
        graph: Arc<dyn GraphQueryPort>,
        telemetry: Arc<dyn TelemetrySink>,
        config: SchemaResolverConfig,
    ) -> Self {
        Self {
            graph,
            telemetry,
            config,
            positive: TtlCache::new(),
            negative: TtlCache::new(),
            compat: TtlCache::new(),
        }
    }

    pub fn config(&self) -> &SchemaResolverConfig {
        &self.config
    }

    /// Resolve a canonical id or shorthand reference to its registry node.
    ///
    /// Positive hits and cached misses never touch the node query. A store
    /// failure or timeout leaves both caches untouched. On a positive hit whose
    /// compat edges cannot be fetched, the node comes back without `compat`.
    pub async fn resolve_schema_id(
        &self,
        reference: &str,
        who: Attribution<'_>,
        include_compat: bool,
    ) -> Result<RegistryNode> {
        let canonical = canonicalize(reference)?;
        let node_id = canonical.to_string();

        if let Some(mut node) = self.positive.get(&node_id) {
            self.emit(TelemetryKind::Hit, &node_id, who);
            // A cached node is served even when its edges cannot be fetched.
            if include_compat {
                match self.compat_for(&node_id, who).await {
                    Ok(buckets) => node.compat = Some(buckets),
                    Err(e) => {
                        tracing::warn!(id = %node_id, error = %e, "compat unavailable for cached node")
                    }
                }
            }
            return Ok(node);
        }

        if self.negative.contains(&node_id) {
            self.emit(TelemetryKind::NegativeHit, &node_id, who);
            return Err(ResolverError::NotFound(format!(
                "{reference} not found (cached miss)"
            )));
        }

        let query = GraphQuery::new("registry.node_by_id", NODE_BY_ID)
            .param("id", node_id.as_str())
            .on_graph(self.config.graph.clone());
        let rows =
            query_with_timeout(self.graph.as_ref(), &query, self.config.query_timeout).await?;

        let Some(row) = rows.first() else {
            self.negative
                .set(node_id.as_str(), (), self.config.negative_ttl);
            self.emit(TelemetryKind::Miss, &node_id, who);
            return Err(ResolverError::NotFound(format!("{reference} not found")));
        };

        let node = node_from_row(
            &node_id,
            canonical.registry_type,
            canonical.version.as_deref(),
            row,
        )?;
        let compat = if include_compat {
            Some(self.compat_for(&node_id, who).await?)
        } else {
            None
        };

        self.positive
            .set(node_id.as_str(), node.clone(), self.config.positive_ttl);
        self.emit(TelemetryKind::Fetch, &node_id, who);
        tracing::debug!(id = %node_id, "registry node fetched");

        Ok(RegistryNode { compat, ..node })
    }

    /// Resolve the highest version of `name` within `type_name`.
    ///
    /// `type_name` may be a registry directory (`Event_Schema`) or a shorthand
    /// hint (`event`). Versions compare numerically per segment.
    pub async fn resolve_latest(
        &self,
        type_name: &str,
        name: &str,
        who: Attribution<'_>,
    ) -> Result<RegistryNode> {
        let type_name = type_name.trim();
        let label = RegistryType::from_dir(type_name)
            .or_else(|| RegistryType::from_hint(type_name))
            .map(|t| t.dir())
            .unwrap_or(type_name);

        let query = GraphQuery::new("registry.nodes_by_type_and_name", NODES_BY_TYPE_AND_NAME)
            .param("type_name", label)
            .param("name", name)
            .on_graph(self.config.graph.clone());
        let rows =
            query_with_timeout(self.graph.as_ref(), &query, self.config.query_timeout).await?;

        let candidates = rows.iter().filter_map(|row| {
            let id = row.get("id")?.as_str()?.to_string();
            let version = row
                .get("version")
                .and_then(PropValue::as_str)
                .unwrap_or("0.0");
            Some((Version::parse(version), id))
        });

        match select_latest(candidates) {
            Some(node_id) => self.resolve_schema_id(&node_id, who, true).await,
            None => {
                self.emit(TelemetryKind::LatestMiss, &format!("{label}/{name}"), who);
                Err(ResolverError::NotFound(format!(
                    "no versions found for {label} '{name}'"
                )))
            }
        }
    }

    /// Compatibility edges of a node, bucketed by release kind.
    ///
    /// Cached under `compat:<node_id>` with the positive TTL.
    pub async fn compat_for(
        &self,
        node_id: &str,
        who: Attribution<'_>,
    ) -> Result<CompatBuckets> {
        let key = compat_key(node_id);
        if let Some(buckets) = self.compat.get(&key) {
            self.emit(TelemetryKind::CompatHit, node_id, who);
            return Ok(buckets);
        }

        let query = compat::edges_query(node_id, self.config.graph.clone());
        let rows =
            query_with_timeout(self.graph.as_ref(), &query, self.config.query_timeout).await?;
        let buckets = compat::bucket_rows(&rows);

        self.compat.set(key, buckets.clone(), self.config.positive_ttl);
        self.telemetry.record(
            TelemetryEvent::new(TelemetryKind::CompatFetch, node_id, who.caller, who.org)
                .with_edge_count(rows.len()),
        );
        Ok(buckets)
    }

    /// Drop every cached entry for `node_id`: positive, negative and compat.
    ///
    /// This is the signal for creations and out-of-band writes; without it a
    /// newly created id stays hidden for up to the negative TTL.
    pub fn invalidate(&self, node_id: &str) -> bool {
        let positive = self.positive.invalidate(node_id);
        let negative = self.negative.invalidate(node_id);
        let compat = self.compat.invalidate(&compat_key(node_id));
        positive || negative || compat
    }

    fn emit(&self, kind: TelemetryKind, subject: &str, who: Attribution<'_>) {
        self.telemetry
            .record(TelemetryEvent::new(kind, subject, who.caller, who.org));
    }
}

fn compat_key(node_id: &str) -> String {
    format!("compat:{node_id}")
}

fn node_from_row(
    node_id: &str,
    registry_type: RegistryType,
    requested_version: Option<&str>,
    row: &Row,
) -> Result<RegistryNode> {
    let properties = row
        .get("props")
        .and_then(PropValue::as_map)
        .cloned()
        .ok_or_else(|| {
            ResolverError::Upstream(format!("registry row for '{node_id}' has no properties"))
        })?;

    let labels = row
        .get("labels")
        .and_then(PropValue::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(PropValue::as_str)
        .filter(|label| *label != NODE_LABEL)
        .map(str::to_string)
        .collect();

    let name = properties
        .get("name")
        .and_then(PropValue::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| id_name(node_id).to_string());
    let version = properties
        .get("version")
        .and_then(PropValue::as_str)
        .or(requested_version)
        .map(str::to_string);

    Ok(RegistryNode {
        id: node_id.to_string(),
        type_name: registry_type.dir().to_string(),
        name,
        version,
        labels,
        properties,
        compat: None,
    })
}

/// `registry/Type/name@1.0` → `name`.
fn id_name(node_id: &str) -> &str {
    let tail = node_id.rsplit('/').next().unwrap_or(node_id);
    tail.split('@').next().unwrap_or(tail)
}

use std::time::Duration;

use thiserror::Error;

/// Every failure the resolution and view layer can produce.
///
/// The first three variants are raised synchronously by the schema resolver.
/// The view pipeline never lets any variant escape; it converts them into a
/// `failure.emit` event via [`ResolverError::reason`].
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("version required: {0}")]
    VersionRequired(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("resolution failed: {0}")]
    Resolution(String),

    #[error("unknown view_type '{requested}' (valid: {})", .valid.join(", "))]
    UnknownViewType {
        requested: String,
        valid: Vec<&'static str>,
    },

    #[error("governance violation: {0}")]
    Governance(#[from] GovernanceViolation),

    #[error("upstream timeout: {operation} exceeded {}ms", .timeout.as_millis())]
    UpstreamTimeout {
        operation: String,
        timeout: Duration,
    },

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ResolverError {
    /// Stable, enumerable reason code carried by failure events.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::VersionRequired(_) => "version_required",
            Self::NotFound(_) => "not_found",
            Self::Resolution(_) => "resolution_error",
            Self::UnknownViewType { .. } => "unknown_view_type",
            Self::Governance(v) => v.reason(),
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::Upstream(_) => "query_failed",
            Self::MalformedRequest(_) => "malformed_request",
            Self::Publish(_) => "publish_failed",
            Self::Internal(_) => "internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::VersionRequired(_)
            | Self::Resolution(_)
            | Self::UnknownViewType { .. }
            | Self::MalformedRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::Governance(GovernanceViolation::RateLimitExceeded { .. }) => 429,
            Self::Governance(GovernanceViolation::PayloadTooLarge { .. }) => 413,
            Self::Governance(_) => 403,
            Self::UpstreamTimeout { .. } => 504,
            Self::Upstream(_) | Self::Publish(_) => 502,
            Self::Internal(_) => 500,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::UpstreamTimeout { .. })
    }
}

/// A policy check that rejected a request or a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GovernanceViolation {
    #[error("payload of {size} bytes exceeds cap of {cap} bytes")]
    PayloadTooLarge { size: usize, cap: usize },

    #[error("tenant '{tenant}' exceeded {limit} requests per {window_secs}s")]
    RateLimitExceeded {
        tenant: String,
        limit: usize,
        window_secs: u64,
    },

    #[error("emitter '{emitter}' is not allowed in namespace '{namespace}'")]
    EmitterNotAllowed { emitter: String, namespace: String },

    #[error("format '{format}' has no price in the schedule")]
    UnpricedFormat { format: String },

    #[error("quote '{quote_id}' is missing or malformed")]
    QuoteInvalid { quote_id: String },
}

impl GovernanceViolation {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::EmitterNotAllowed { .. } => "emitter_not_allowed",
            Self::UnpricedFormat { .. } => "unpriced_format",
            Self::QuoteInvalid { .. } => "quote_invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── reason codes ─────────────────────────────────────────────

    #[test]
    fn reason_codes_are_specific() {
        assert_eq!(
            ResolverError::VersionRequired("x".into()).reason(),
            "version_required"
        );
        assert_eq!(ResolverError::NotFound("x".into()).reason(), "not_found");
        assert_eq!(ResolverError::Upstream("x".into()).reason(), "query_failed");
        let gov: ResolverError = GovernanceViolation::PayloadTooLarge { size: 2, cap: 1 }.into();
        assert_eq!(gov.reason(), "payload_too_large");
    }

    // ── http_status ──────────────────────────────────────────────

    #[test]
    fn http_status_mapping() {
        assert_eq!(ResolverError::NotFound("x".into()).http_status(), 404);
        assert_eq!(ResolverError::Resolution("x".into()).http_status(), 400);
        let timeout = ResolverError::UpstreamTimeout {
            operation: "registry.node_by_id".into(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(timeout.http_status(), 504);
        assert!(timeout.is_timeout());
        let limited: ResolverError = GovernanceViolation::RateLimitExceeded {
            tenant: "acme".into(),
            limit: 1,
            window_secs: 60,
        }
        .into();
        assert_eq!(limited.http_status(), 429);
    }

    // ── Display ──────────────────────────────────────────────────

    #[test]
    fn display_unknown_view_type_lists_valid_options() {
        let e = ResolverError::UnknownViewType {
            requested: "timeline".into(),
            valid: vec!["architecture", "api-reference", "coverage", "index"],
        };
        assert_eq!(
            e.to_string(),
            "unknown view_type 'timeline' (valid: architecture, api-reference, coverage, index)"
        );
    }

    #[test]
    fn display_timeout() {
        let e = ResolverError::UpstreamTimeout {
            operation: "views.coverage".into(),
            timeout: Duration::from_millis(1500),
        };
        assert_eq!(
            e.to_string(),
            "upstream timeout: views.coverage exceeded 1500ms"
        );
    }
}

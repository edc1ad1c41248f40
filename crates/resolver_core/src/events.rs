//! Bus envelopes and the event payloads the view layer consumes and produces.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const VIEW_REQUEST: &str = "docs.view.request";
pub const VIEW_RESULT: &str = "docs.view.result";
pub const VIEW_INVALIDATED: &str = "docs.view.invalidated";
pub const FAILURE_EMIT: &str = "failure.emit";
pub const GRAPH_DELTA_PREFIX: &str = "graph.delta.";

/// Origin stamped on everything this process publishes.
pub const RESOLVER_ORIGIN: &str = "l2.resolver";

/// Bus injection envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: String,
    pub payload: serde_json::Value,
    /// Emitter identity, checked against the namespace allow-list.
    pub origin: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(channel: impl Into<String>, payload: serde_json::Value, origin: &str) -> Self {
        Self {
            channel: channel.into(),
            payload,
            origin: origin.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Serialize a typed payload into an envelope from this resolver.
    pub fn outbound<T: Serialize>(channel: &str, payload: &T) -> serde_json::Result<Self> {
        Ok(Self::new(channel, serde_json::to_value(payload)?, RESOLVER_ORIGIN))
    }

    /// Governance namespace: the first dot-separated segment of the channel.
    pub fn namespace(&self) -> &str {
        namespace_of(&self.channel)
    }
}

pub fn namespace_of(channel: &str) -> &str {
    channel.split('.').next().unwrap_or(channel)
}

/// Inbound `docs.view.request`.
///
/// `view_type` and `format` stay strings here so that unknown values surface
/// as enumerated failures instead of deserialization errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRequestEvent {
    pub request_id: String,
    pub view_type: String,
    pub scope_org: String,
    #[serde(default = "default_scope_path")]
    pub scope_path: String,
    pub format: String,
    #[serde(default)]
    pub quote_id: Option<String>,
}

fn default_scope_path() -> String {
    "/".to_string()
}

/// Outbound `docs.view.result` (success only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewResultEvent {
    pub request_id: String,
    pub view_type: String,
    pub format: String,
    pub payload: String,
    pub content_digest: String,
    pub price: Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub currency: String,
    pub amount: Decimal,
}

/// Outbound `failure.emit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub component: String,
    pub reason: String,
    pub detail: String,
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Inbound `docs.view.invalidated`. `*` matches any view type or path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub view_type: String,
    pub scope_org: String,
    #[serde(default = "wildcard")]
    pub scope_path: String,
}

fn wildcard() -> String {
    "*".to_string()
}

/// Inbound `graph.delta.*`: a write happened somewhere in an org's graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDeltaEvent {
    pub scope_org: String,
    #[serde(default)]
    pub node_ids: Vec<String>,
}

/// Broadcast after a graph delta purged cached views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidatedBroadcast {
    pub scope_org: String,
    pub reasons: Vec<String>,
    pub affects: Vec<String>,
}

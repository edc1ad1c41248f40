//! Port traits the resolution layer depends on.
//! Implemented by `resolver_graph` (HTTP store) and `resolver_server` (bus);
//! in-memory doubles live in [`crate::memory`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ResolverError;
use crate::events::Envelope;
use crate::value::PropValue;

pub type Result<T> = std::result::Result<T, ResolverError>;

/// One result row, column name → decoded value.
pub type Row = BTreeMap<String, PropValue>;

/// A parameterized graph query.
///
/// `statement` is always a fixed template; caller-supplied text only ever
/// travels in `params`.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQuery {
    /// Stable label used for logging, telemetry and test doubles.
    pub name: &'static str,
    pub statement: &'static str,
    pub params: BTreeMap<String, PropValue>,
    /// Target graph; `None` means the adapter's default graph.
    pub graph: Option<String>,
}

impl GraphQuery {
    pub fn new(name: &'static str, statement: &'static str) -> Self {
        Self {
            name,
            statement,
            params: BTreeMap::new(),
            graph: None,
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<PropValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn on_graph(mut self, graph: Option<String>) -> Self {
        self.graph = graph;
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(PropValue::as_str)
    }
}

/// Narrow interface to a property-graph store.
#[async_trait]
pub trait GraphQueryPort: Send + Sync {
    /// Run a parameterized query and return decoded rows.
    ///
    /// Implementations map transport failures to [`ResolverError::Upstream`]
    /// and deadline expiry to [`ResolverError::UpstreamTimeout`].
    async fn query(&self, query: &GraphQuery) -> Result<Vec<Row>>;
}

/// Run `query` under a deadline.
///
/// Expiry becomes [`ResolverError::UpstreamTimeout`] tagged with the query
/// name; the in-flight call is dropped.
pub async fn query_with_timeout(
    graph: &dyn GraphQueryPort,
    query: &GraphQuery,
    timeout: Duration,
) -> Result<Vec<Row>> {
    match tokio::time::timeout(timeout, graph.query(query)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                query = query.name,
                timeout_ms = timeout.as_millis() as u64,
                "graph query timed out"
            );
            Err(ResolverError::UpstreamTimeout {
                operation: query.name.to_string(),
                timeout,
            })
        }
    }
}

/// Outbound side of the event bus.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, envelope: Envelope) -> Result<()>;
}

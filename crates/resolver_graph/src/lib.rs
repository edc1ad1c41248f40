//! HTTP adapter for the graph store.
//!
//! The store exposes a single query endpoint:
//!
//! ```text
//! POST <url>
//! X-API-Key: <key>
//! {"graph_name": "...", "query": "...", "params": {...}}
//!
//! 200 {"data": {"result": [ {col: value, ...}, ... ], "columns": [...]}}
//! ```
//!
//! Rows come back either as objects or, when the store sends `columns`, as
//! positional arrays. Both are decoded into typed [`Row`]s here so nothing
//! above the port ever sees raw storage JSON.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use resolver_core::ports::{GraphQuery, GraphQueryPort, Result, Row};
use resolver_core::value::decode_properties;
use resolver_core::{PropValue, ResolverError};

pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone)]
pub struct GraphClientConfig {
    pub url: String,
    pub api_key: String,
    /// Graph used when a query does not name one.
    pub default_graph: String,
    pub timeout: Duration,
}

impl GraphClientConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            default_graph: "protocol".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_default_graph(mut self, graph: impl Into<String>) -> Self {
        self.default_graph = graph.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Error)]
pub enum GraphClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("request to graph store failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("graph store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable graph response: {0}")]
    Decode(String),
}

#[derive(Serialize)]
struct QueryBody<'a> {
    graph_name: &'a str,
    query: &'a str,
    params: serde_json::Map<String, JsonValue>,
}

pub struct HttpGraphClient {
    http: Client,
    config: GraphClientConfig,
}

impl HttpGraphClient {
    pub fn new(config: GraphClientConfig) -> std::result::Result<Self, GraphClientError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(GraphClientError::Build)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GraphClientConfig {
        &self.config
    }

    async fn execute(&self, query: &GraphQuery) -> std::result::Result<Vec<Row>, GraphClientError> {
        let graph_name = query.graph.as_deref().unwrap_or(&self.config.default_graph);
        let body = QueryBody {
            graph_name,
            query: query.statement,
            params: query
                .params
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        };

        let response = self
            .http
            .post(&self.config.url)
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(GraphClientError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GraphClientError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let json: JsonValue = response
            .json()
            .await
            .map_err(GraphClientError::Transport)?;
        decode_rows(json)
    }
}

#[async_trait]
impl GraphQueryPort for HttpGraphClient {
    async fn query(&self, query: &GraphQuery) -> Result<Vec<Row>> {
        tracing::debug!(query = query.name, graph = ?query.graph, "graph query");
        self.execute(query).await.map_err(|e| match e {
            GraphClientError::Transport(ref source) if source.is_timeout() => {
                ResolverError::UpstreamTimeout {
                    operation: query.name.to_string(),
                    timeout: self.config.timeout,
                }
            }
            other => {
                tracing::error!(query = query.name, error = %other, "graph query failed");
                ResolverError::Upstream(other.to_string())
            }
        })
    }
}

/// Decode a store response body into typed rows.
///
/// A body without `data.result` is an empty result set.
pub fn decode_rows(body: JsonValue) -> std::result::Result<Vec<Row>, GraphClientError> {
    let JsonValue::Object(mut top) = body else {
        return Err(GraphClientError::Decode("body is not an object".into()));
    };
    let Some(JsonValue::Object(mut data)) = top.remove("data") else {
        return Ok(Vec::new());
    };
    let columns: Option<Vec<String>> = match data.remove("columns") {
        Some(JsonValue::Array(cols)) => Some(
            cols.into_iter()
                .map(|c| match c {
                    JsonValue::String(s) => Ok(s),
                    other => Err(GraphClientError::Decode(format!(
                        "column name is not a string: {other}"
                    ))),
                })
                .collect::<std::result::Result<_, _>>()?,
        ),
        _ => None,
    };
    let rows = match data.remove("result") {
        Some(JsonValue::Array(rows)) => rows,
        Some(JsonValue::Null) | None => return Ok(Vec::new()),
        Some(other) => {
            return Err(GraphClientError::Decode(format!(
                "result is not a list: {other}"
            )))
        }
    };

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| decode_row(i, row, columns.as_deref()))
        .collect()
}

fn decode_row(
    index: usize,
    row: JsonValue,
    columns: Option<&[String]>,
) -> std::result::Result<Row, GraphClientError> {
    match (row, columns) {
        (JsonValue::Object(map), _) => Ok(decode_properties(map)),
        (JsonValue::Array(values), Some(columns)) => {
            if values.len() != columns.len() {
                return Err(GraphClientError::Decode(format!(
                    "row {index} has {} values for {} columns",
                    values.len(),
                    columns.len()
                )));
            }
            Ok(columns
                .iter()
                .cloned()
                .zip(values.into_iter().map(PropValue::from_stored))
                .collect())
        }
        (other, _) => Err(GraphClientError::Decode(format!(
            "row {index} is neither an object nor a positional row: {other}"
        ))),
    }
}

//! ViewResolver: Select → Governance → Cache → Project → Render → Emit.
//!
//! Per request the pipeline ends in exactly one published event, either
//! `docs.view.result` or `failure.emit`. Errors never escape `handle_*`; they
//! are turned into failure events and the outcome is returned for logging.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;

use crate::error::ResolverError;
use crate::events::{
    Envelope, FailureEvent, GraphDeltaEvent, InvalidatedBroadcast, InvalidationEvent,
    ViewRequestEvent, ViewResultEvent, FAILURE_EMIT, VIEW_INVALIDATED, VIEW_RESULT,
};
use crate::governance::{GateRequest, GovernanceDecision, GovernanceGate};
use crate::ports::{query_with_timeout, EventBus, GraphQueryPort, Result};
use crate::views::cache::{ViewCache, ViewKey, ViewSelector};
use crate::views::projector::project;
use crate::views::renderer::{render, ViewResult};
use crate::views::selector::{select, ViewType};

pub const COMPONENT: &str = "view_resolver";

#[derive(Debug, Clone)]
pub struct ViewResolverConfig {
    pub view_ttl: Duration,
    pub query_timeout: Duration,
    pub graph: Option<String>,
}

impl Default for ViewResolverConfig {
    fn default() -> Self {
        Self {
            view_ttl: Duration::from_secs(300),
            query_timeout: Duration::from_secs(10),
            graph: None,
        }
    }
}

impl ViewResolverConfig {
    pub fn with_view_ttl(mut self, ttl: Duration) -> Self {
        self.view_ttl = ttl;
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

/// Pipeline stage, named in failure events as `view_resolver.<stage>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Select,
    Governance,
    Project,
    Render,
    Emit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Select => "select",
            Stage::Governance => "governance",
            Stage::Project => "project",
            Stage::Render => "render",
            Stage::Emit => "emit",
        }
    }
}

/// What happened to one request.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewOutcome {
    Emitted {
        request_id: String,
        content_digest: String,
        cache_hit: bool,
    },
    Failed {
        request_id: String,
        stage: Stage,
        reason: &'static str,
        detail: String,
    },
}

impl ViewOutcome {
    pub fn is_emitted(&self) -> bool {
        matches!(self, ViewOutcome::Emitted { .. })
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            ViewOutcome::Failed { reason, .. } => Some(*reason),
            ViewOutcome::Emitted { .. } => None,
        }
    }
}

struct StageError {
    stage: Stage,
    error: ResolverError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T, E: Into<ResolverError>> AtStage<T> for std::result::Result<T, E> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|e| StageError {
            stage,
            error: e.into(),
        })
    }
}

pub struct ViewResolver {
    graph: Arc<dyn GraphQueryPort>,
    bus: Arc<dyn EventBus>,
    gate: Arc<GovernanceGate>,
    cache: ViewCache,
    config: ViewResolverConfig,
}

impl ViewResolver {
    pub fn new(
        graph: Arc<dyn GraphQueryPort>,
        bus: Arc<dyn EventBus>,
        gate: Arc<GovernanceGate>,
        config: ViewResolverConfig,
    ) -> Self {
        Self {
            graph,
            bus,
            gate,
            cache: ViewCache::new(config.view_ttl),
            config,
        }
    }

    pub fn cache(&self) -> &ViewCache {
        &self.cache
    }

    /// Handle an inbound `docs.view.request` envelope.
    pub async fn handle_request(&self, envelope: &Envelope) -> ViewOutcome {
        let request: ViewRequestEvent = match decode(envelope) {
            Ok(request) => request,
            Err(error) => {
                let request_id = envelope
                    .payload
                    .get("request_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                return self
                    .fail(request_id, StageError { stage: Stage::Decode, error })
                    .await;
            }
        };

        let request_id = request.request_id.clone();
        match self.run(envelope, &request).await {
            Ok(outcome) => outcome,
            Err(failure) => self.fail(request_id, failure).await,
        }
    }

    async fn run(
        &self,
        envelope: &Envelope,
        request: &ViewRequestEvent,
    ) -> std::result::Result<ViewOutcome, StageError> {
        // SELECTED
        let view_type = request.view_type.parse::<ViewType>().at(Stage::Select)?;

        // GOVERNANCE_CHECKED
        let namespace = envelope.namespace();
        let precheck = self.gate.precheck(&GateRequest {
            namespace,
            emitter: &envelope.origin,
            tenant: &request.scope_org,
            format: &request.format,
            quote_id: request.quote_id.as_deref(),
        });
        let decision = GovernanceDecision::from(&precheck);
        tracing::debug!(
            request_id = %request.request_id,
            allowed = decision.allowed,
            reason = decision.reason.as_deref().unwrap_or("-"),
            "governance precheck"
        );
        let format = precheck.at(Stage::Governance)?;

        // CACHE_HIT | PROJECTED
        let key = ViewKey::new(view_type, &request.scope_org, &request.scope_path);
        let (model, cache_hit) = match self.cache.get_model(&key) {
            Some(model) => (model, true),
            None => {
                let query = select(
                    view_type,
                    &request.scope_org,
                    &request.scope_path,
                    self.config.graph.clone(),
                );
                let rows =
                    query_with_timeout(self.graph.as_ref(), &query, self.config.query_timeout)
                        .await
                        .at(Stage::Project)?;
                let model = Arc::new(project(
                    view_type,
                    &request.scope_org,
                    &request.scope_path,
                    &rows,
                ));
                self.cache.set_model(key.clone(), model.clone());
                (model, false)
            }
        };

        // RENDERED
        let cached = self.cache.get_rendered(&key, format, &model.content_digest);
        let rendered: ViewResult = match cached {
            Some(hit) => hit,
            None => {
                let result = render(&model, format, self.gate.prices()).at(Stage::Render)?;
                self.cache.set_rendered(key.clone(), result.clone());
                result
            }
        };

        // EMITTED
        self.gate
            .check_payload(namespace, rendered.payload.len())
            .at(Stage::Emit)?;

        let event = ViewResultEvent {
            request_id: request.request_id.clone(),
            view_type: view_type.as_str().to_string(),
            format: rendered.format.as_str().to_string(),
            payload: rendered.payload,
            content_digest: rendered.content_digest.clone(),
            price: rendered.price,
        };
        let envelope = Envelope::outbound(VIEW_RESULT, &event)
            .map_err(|e| ResolverError::Internal(e.into()))
            .at(Stage::Emit)?;
        self.bus.publish(envelope).await.at(Stage::Emit)?;

        tracing::info!(
            request_id = %request.request_id,
            view = %key,
            format = format.as_str(),
            cache_hit,
            "view emitted"
        );
        Ok(ViewOutcome::Emitted {
            request_id: request.request_id.clone(),
            content_digest: rendered.content_digest,
            cache_hit,
        })
    }

    /// Publish exactly one `failure.emit` for a request.
    async fn fail(&self, request_id: String, failure: StageError) -> ViewOutcome {
        let StageError { stage, error } = failure;
        let reason = error.reason();
        let detail = error.to_string();
        tracing::warn!(%request_id, stage = stage.as_str(), reason, %detail, "view request failed");

        let event = FailureEvent {
            component: format!("{COMPONENT}.{}", stage.as_str()),
            reason: reason.to_string(),
            detail: detail.clone(),
            correlation_id: request_id.clone(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.publish(FAILURE_EMIT, &event).await {
            tracing::error!(%request_id, error = %e, "failure event could not be published");
        }

        ViewOutcome::Failed {
            request_id,
            stage,
            reason,
            detail,
        }
    }

    /// Handle an inbound `docs.view.invalidated` envelope. Returns the number
    /// of cached views purged.
    pub fn handle_invalidation(&self, envelope: &Envelope) -> usize {
        match decode::<InvalidationEvent>(envelope) {
            Ok(event) => self.cache.invalidate(&ViewSelector::new(
                &event.view_type,
                &event.scope_org,
                &event.scope_path,
            )),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed invalidation");
                0
            }
        }
    }

    /// Handle a `graph.delta.*` envelope: purge the org's views and broadcast
    /// `docs.view.invalidated`.
    pub async fn handle_graph_delta(&self, envelope: &Envelope) -> Result<usize> {
        let delta: GraphDeltaEvent = decode(envelope)?;
        let selector = ViewSelector::whole_org(&delta.scope_org);
        let removed = self.cache.invalidate(&selector);

        let broadcast = InvalidatedBroadcast {
            scope_org: delta.scope_org.clone(),
            reasons: vec![envelope.channel.clone()],
            affects: ViewType::ALL
                .iter()
                .map(|t| format!("{t}:{}:*", delta.scope_org))
                .collect(),
        };
        self.publish(VIEW_INVALIDATED, &broadcast).await?;
        Ok(removed)
    }

    async fn publish<T: serde::Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let envelope =
            Envelope::outbound(channel, payload).map_err(|e| ResolverError::Internal(e.into()))?;
        self.bus.publish(envelope).await
    }
}

fn decode<T: DeserializeOwned>(envelope: &Envelope) -> Result<T> {
    serde_json::from_value(envelope.payload.clone()).map_err(|e| {
        ResolverError::MalformedRequest(format!("{} payload: {e}", envelope.channel))
    })
}

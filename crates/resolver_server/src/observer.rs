//! BusObserver: the single consumer of inbound bus envelopes.
//!
//! Envelopes arrive on a bounded queue (filled by `POST /inject`) and are
//! handled one at a time in arrival order. Nothing a handler does can stop
//! the loop; only the shutdown signal or a closed queue ends it.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use resolver_core::events::{
    GraphDeltaEvent, GRAPH_DELTA_PREFIX, RESOLVER_ORIGIN, VIEW_INVALIDATED, VIEW_REQUEST,
};
use resolver_core::{Envelope, SchemaResolver, ViewResolver};

/// Where an inbound envelope goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    ViewRequest,
    Invalidation,
    GraphDelta,
    Ignored,
}

pub fn route(envelope: &Envelope) -> Route {
    // Our own broadcasts come back through the bus.
    if envelope.origin == RESOLVER_ORIGIN {
        return Route::Ignored;
    }
    match envelope.channel.as_str() {
        VIEW_REQUEST => Route::ViewRequest,
        VIEW_INVALIDATED => Route::Invalidation,
        c if c.starts_with(GRAPH_DELTA_PREFIX) => Route::GraphDelta,
        _ => Route::Ignored,
    }
}

pub struct BusObserver {
    views: Arc<ViewResolver>,
    schemas: Arc<SchemaResolver>,
    inbox: mpsc::Receiver<Envelope>,
    shutdown: watch::Receiver<bool>,
}

impl BusObserver {
    pub fn new(
        views: Arc<ViewResolver>,
        schemas: Arc<SchemaResolver>,
        inbox: mpsc::Receiver<Envelope>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            views,
            schemas,
            inbox,
            shutdown,
        }
    }

    /// Consume until shutdown is signalled or every sender is gone.
    pub async fn run(mut self) {
        tracing::info!("bus observer started");
        loop {
            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                next = self.inbox.recv() => match next {
                    Some(envelope) => self.dispatch(&envelope).await,
                    None => break,
                },
            }
        }
        tracing::info!("bus observer stopped");
    }

    pub async fn dispatch(&self, envelope: &Envelope) {
        match route(envelope) {
            Route::ViewRequest => {
                let outcome = self.views.handle_request(envelope).await;
                tracing::debug!(?outcome, "view request handled");
            }
            Route::Invalidation => {
                let removed = self.views.handle_invalidation(envelope);
                tracing::debug!(removed, "invalidation handled");
            }
            Route::GraphDelta => self.graph_delta(envelope).await,
            Route::Ignored => {
                tracing::debug!(
                    channel = %envelope.channel,
                    origin = %envelope.origin,
                    "envelope ignored"
                );
            }
        }
    }

    /// Purge the org's views, and any registry nodes the delta names.
    async fn graph_delta(&self, envelope: &Envelope) {
        if let Ok(delta) = serde_json::from_value::<GraphDeltaEvent>(envelope.payload.clone()) {
            for node_id in &delta.node_ids {
                self.schemas.invalidate(node_id);
            }
        }
        match self.views.handle_graph_delta(envelope).await {
            Ok(removed) => tracing::debug!(removed, channel = %envelope.channel, "graph delta handled"),
            Err(e) => tracing::warn!(error = %e, channel = %envelope.channel, "graph delta not handled"),
        }
    }
}

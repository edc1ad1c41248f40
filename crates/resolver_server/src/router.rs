//! Router construction for the view resolver process.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use resolver_core::{Envelope, SchemaResolver};

use crate::handlers;

pub fn build_router(schemas: Arc<SchemaResolver>, inbox: mpsc::Sender<Envelope>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/inject", post(handlers::inject::inject))
        .route("/schemas/resolve", get(handlers::schemas::resolve))
        .route("/schemas/latest", get(handlers::schemas::latest))
        .route("/schemas/compat", get(handlers::schemas::compat))
        .layer(Extension(schemas))
        .layer(Extension(inbox))
        .layer(TraceLayer::new_for_http())
}

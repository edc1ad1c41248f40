use axum::{extract::Extension, Json};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use resolver_core::Envelope;

/// GET /health
pub async fn health(Extension(inbox): Extension<mpsc::Sender<Envelope>>) -> Json<Value> {
    Json(json!({
        "status": if inbox.is_closed() { "degraded" } else { "ok" },
        "queue_free": inbox.capacity(),
        "queue_capacity": inbox.max_capacity(),
    }))
}

//! POST /inject: hand an envelope to the bus observer.
//!
//! Never waits for queue space. A full queue is back-pressure to the caller.

use axum::{extract::Extension, http::StatusCode, Json};
use serde_json::{json, Value};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use resolver_core::Envelope;

use crate::error::AppError;

pub async fn inject(
    Extension(inbox): Extension<mpsc::Sender<Envelope>>,
    Json(envelope): Json<Envelope>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let receipt = Uuid::new_v4();
    let channel = envelope.channel.clone();
    match inbox.try_send(envelope) {
        Ok(()) => {
            tracing::debug!(%receipt, %channel, "envelope queued");
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({ "queued": true, "receipt": receipt })),
            ))
        }
        Err(TrySendError::Full(_)) => {
            tracing::warn!(%channel, "inbound queue full, rejecting envelope");
            Err(AppError::QueueFull)
        }
        Err(TrySendError::Closed(_)) => Err(AppError::QueueClosed),
    }
}

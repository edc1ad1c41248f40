//! HTTP error mapping for the REST surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use resolver_core::ResolverError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error("inbound queue is full")]
    QueueFull,

    #[error("inbound queue is closed")]
    QueueClosed,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Resolver(e) => {
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            AppError::QueueFull | AppError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            AppError::Resolver(e) => e.reason(),
            AppError::QueueFull => "queue_full",
            AppError::QueueClosed => "queue_closed",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        }
        let body = json!({ "error": self.to_string(), "reason": self.reason() });
        (status, Json(body)).into_response()
    }
}

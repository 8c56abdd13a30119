//! API error responses: structured JSON with the right status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use atlas::error::AgentError;

/// Error surface of the HTTP layer.
#[derive(Debug)]
pub enum ApiError {
    /// Invalid enum value on an override (422).
    Validation { field: &'static str, detail: String },
    /// Missing required header (422).
    MissingHeader { header: &'static str },
    /// Service not yet initialised (503).
    ServiceUnavailable,
    /// Request exceeded the hard timeout (504).
    Timeout,
    /// No checkpoint for the thread (404).
    NotFound,
    /// Everything else (500).
    Internal(String),
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<atlas::memory::CheckpointError> for ApiError {
    fn from(e: atlas::memory::CheckpointError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation { field, detail } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({"detail": detail, "field": field}),
            ),
            ApiError::MissingHeader { header } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({"detail": format!("missing required header {header}"), "field": header}),
            ),
            ApiError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"detail": "Service not ready. Please try again shortly."}),
            ),
            ApiError::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                json!({"detail": "Request timed out."}),
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                json!({"detail": "No conversation found for this thread."}),
            ),
            ApiError::Internal(detail) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({"detail": detail}))
            }
        };
        (status, Json(body)).into_response()
    }
}

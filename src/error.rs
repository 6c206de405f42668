//! Error taxonomy for the gateway.
//!
//! Backend-level failures (`BackendError`) are surfaced through the dispatch
//! layer as `GatewayError`, which maps every variant to an HTTP status and a
//! human-readable detail string. Nothing is retried internally.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::time::Duration;

/// Failures raised by a backend while embedding or swapping.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The requested model is not in a swapping backend's configured set.
    #[error("model '{0}' is not in this backend's configured model set")]
    UnsupportedModel(String),

    /// The remote inference call returned a non-success status.
    #[error("upstream returned HTTP {status}: {detail}")]
    Upstream { status: u16, detail: String },

    /// The remote inference call failed at the transport level.
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// The remote service answered with a body the gateway could not parse.
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    /// Stopping or starting the inference process failed. The backend's
    /// current model is left unchanged.
    #[error("failed to swap model to '{model}': {reason}")]
    Swap { model: String, reason: String },

    /// The restarted process never reported healthy within the deadline.
    /// The current model is rolled back; the process may be left running in
    /// an unknown state.
    #[error("backend did not become healthy within {deadline:?} while loading '{model}'")]
    SwapTimeout { model: String, deadline: Duration },
}

/// Errors surfaced on the HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("model '{model}' not found. Available models: {}", format_models(.available))]
    ModelNotFound {
        model: String,
        available: Vec<String>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("service not initialized")]
    NotReady,

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Backend(BackendError::UnsupportedModel(_)) => StatusCode::BAD_REQUEST,
            GatewayError::Backend(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

fn format_models(models: &[String]) -> String {
    if models.is_empty() {
        "(none)".to_string()
    } else {
        models.join(", ")
    }
}

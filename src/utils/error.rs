use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ToolpassError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for ToolpassError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ToolpassError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ToolpassError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            // Backend detail stays in the logs.
            ToolpassError::Store(e) if e.is_transient() => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Entitlement store unavailable".to_string(),
            ),
            ToolpassError::Store(_) | ToolpassError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            ToolpassError::ConfigError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server misconfigured".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = Json(serde_json::json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<config::ConfigError> for ToolpassError {
    fn from(err: config::ConfigError) -> Self {
        ToolpassError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for ToolpassError {
    fn from(err: std::io::Error) -> Self {
        ToolpassError::InternalError(format!("IO error: {}", err))
    }
}

//! Error types for cs-api

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use cs_core::GatewayError;

/// cs-api error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Chat page unavailable: {0}")]
    ChatPage(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] cs_core::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

/// Error body returned to clients
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Failure kind for completion errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::ChatPage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Core(cs_core::Error::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            Self::Core(cs_core::Error::Gateway(GatewayError::Timeout(_))) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            Self::Core(cs_core::Error::Gateway(_)) => StatusCode::BAD_GATEWAY,
            Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            // Upstream details stay in the logs
            Self::Core(cs_core::Error::Gateway(e)) => ErrorResponse {
                error: "completion service failed".to_string(),
                kind: Some(e.kind()),
            },
            Self::Core(cs_core::Error::InvalidInput(msg)) => ErrorResponse {
                error: msg.clone(),
                kind: None,
            },
            Self::ChatPage(_) => ErrorResponse {
                error: "chat page unavailable".to_string(),
                kind: None,
            },
            other => ErrorResponse {
                error: other.to_string(),
                kind: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed with {}: {}", status, self);
        }
        (status, Json(self.body())).into_response()
    }
}

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Main error type for orchestrator operations
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Backing store error: {0}")]
    BackingStore(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Strategy not found: {0}")]
    StrategyNotFound(String),

    #[error("Alert not found: {0}")]
    AlertNotFound(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrchestratorError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::StrategyNotFound(_) | Self::AlertNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidSchedule(_) | Self::InvalidPattern(_) | Self::Config(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::BackingStore(_) | Self::ConnectionFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Compression(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(err: std::io::Error) -> Self {
        Self::Compression(err.to_string())
    }
}

/// Implement IntoResponse for Axum integration
impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

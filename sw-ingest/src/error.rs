//! HTTP error type for sw-ingest handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// 404
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// 400
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// 409, action not allowed in the current stage
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 502, classifier failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// 500
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UnknownObservation(_) => ApiError::NotFound(err.to_string()),
            SessionError::InvalidStage { .. }
            | SessionError::InputsLocked(_)
            | SessionError::Incomplete => ApiError::Conflict(err.to_string()),
            SessionError::UnknownSpecies(_) | SessionError::Observation(_) => {
                ApiError::BadRequest(err.to_string())
            }
            SessionError::Classification { .. } => ApiError::Upstream(err.to_string()),
            SessionError::Workflow(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, "CLASSIFICATION_FAILED", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sealock_engine::EngineError;
use serde::Serialize;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Missing chunk indices, for incomplete finalize attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<u32>>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Engine(e) => match e {
                EngineError::InvalidInput(_) => "invalid_input",
                EngineError::NotFound(_) => "not_found",
                EngineError::Conflict(_) => "conflict",
                EngineError::Incomplete { .. } => "incomplete_upload",
                EngineError::Transient(_) => "transient_failure",
                EngineError::Fatal(_) => "internal_error",
                EngineError::Cancelled => "cancelled",
            },
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Engine(e) => match e {
                EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::Conflict(_) => StatusCode::CONFLICT,
                EngineError::Incomplete { .. } => StatusCode::BAD_REQUEST,
                EngineError::Transient(_)
                | EngineError::Fatal(_)
                | EngineError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn missing(&self) -> Option<Vec<u32>> {
        match self {
            Self::Engine(EngineError::Incomplete { missing }) => Some(missing.clone()),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            missing: self.missing(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

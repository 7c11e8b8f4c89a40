//! Error handling for the REST API server.
//!
//! Every error leaves the server as `{"status":"error","message":...}`. The
//! HTTP status is recorded on the response and later rewritten to 200 by
//! [`crate::middleware::envelope_status_middleware`] unless conventional
//! status codes are enabled.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chromabase_core::ChromaError;
use serde::Serialize;
use std::fmt;

/// Marker placed on error responses so middleware can find them.
#[derive(Debug, Clone, Copy)]
pub struct ErrorEnvelope;

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: "error",
            message: self.message,
            code: self.code,
        };

        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(ErrorEnvelope);
        response
    }
}

impl From<ChromaError> for ApiError {
    fn from(err: ChromaError) -> Self {
        let code = err.code().as_str();
        let status = match &err {
            ChromaError::Validation { .. } => StatusCode::BAD_REQUEST,
            ChromaError::UnknownCollection { .. } | ChromaError::NotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ChromaError::Persistence { .. } | ChromaError::Network { .. } => StatusCode::BAD_GATEWAY,
            ChromaError::Broadcast { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(code, error = %err, "Request failed");
        }
        ApiError::new(status, code, err.to_string())
    }
}

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_status_and_code() {
        let err = ApiError::from(ChromaError::validation("Invalid email format"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Invalid email format");

        let err = ApiError::from(ChromaError::not_found("leads", "x"));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Not found");
        assert_eq!(err.code, "STORE_001");

        let err = ApiError::from(ChromaError::persistence("permission denied"));
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_response_is_marked_as_envelope() {
        let response = ApiError::bad_request("URL required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.extensions().get::<ErrorEnvelope>().is_some());
    }
}

//! Error types for the resource cache subsystem
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::cache::StoreError;
use crate::network::FetchError;

// == Cache Error Enum ==
/// Unified error type for the subsystem and its diagnostics surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Requested resource is not cached
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rejected configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Terminal failure of an upstream fetch
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Durable store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            CacheError::Fetch(FetchError::Offline) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Fetch(_) => StatusCode::BAD_GATEWAY,
            CacheError::Store(_) | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the subsystem.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CacheError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (CacheError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (CacheError::Fetch(FetchError::http(503)), StatusCode::BAD_GATEWAY),
            (CacheError::Fetch(FetchError::Offline), StatusCode::SERVICE_UNAVAILABLE),
            (CacheError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_fetch_error_is_transparent() {
        let error = CacheError::from(FetchError::Timeout(250));
        assert_eq!(error.to_string(), "Request timed out after 250ms");
    }
}

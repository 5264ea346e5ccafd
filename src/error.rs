//! Error types for the paged journal
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the paged cache and its HTTP surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Element access beyond the authoritative count
    #[error("Index {index} out of range (count {count})")]
    OutOfRange { index: usize, count: usize },

    /// Provider call failed (synchronous mode only; async mode reports via events)
    #[error("Provider failure: {0}")]
    Provider(#[from] anyhow::Error),

    /// Invalid configuration or request parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tail reload did not see the first page settle in time
    #[error("Reload timed out after {0:?}")]
    ReloadTimedOut(Duration),

    /// Malformed HTTP request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The task owning the cache has shut down
    #[error("Cache owner has shut down")]
    OwnerGone,
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::OutOfRange { .. } => StatusCode::NOT_FOUND,
            CacheError::InvalidConfig(_) | CacheError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::Provider(_) => StatusCode::BAD_GATEWAY,
            CacheError::ReloadTimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
            CacheError::OwnerGone => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the paged journal.
pub type Result<T> = std::result::Result<T, CacheError>;

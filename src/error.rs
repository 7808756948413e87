//! Error types for the cache server
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type returned by the cache engine and the HTTP layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is empty or not usable as a single path segment
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A single object is larger than the whole cache
    #[error("File too large: {size} bytes exceeds cache capacity of {max_size} bytes")]
    FileTooLarge { size: u64, max_size: u64 },

    /// The storage backend failed to write the blob
    #[error("Failed to add to cache: {0}")]
    CacheAddFailure(String),

    /// The durable metadata write failed
    #[error("Failed to write cache metadata: {0}")]
    MetadataWriteFailure(String),

    /// The durable metadata could not be read
    #[error("Failed to read cache metadata: {0}")]
    MetadataReadFailure(String),

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Blob could not be read despite the key being present
    #[error("Failed to read from backend: {0}")]
    BackendReadFailure(String),

    /// Blob could not be deleted from the backend
    #[error("Failed to delete from backend: {0}")]
    BackendDeleteFailure(String),

    /// Configured backend name is not recognised
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// Eviction was required but the recency index was empty
    #[error("Eviction requested with an empty recency index")]
    EmptyIndex,

    /// Malformed request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The request body hit the upload size limit before it was fully read
    #[error("Upload exceeds the cache capacity of {max_size} bytes")]
    UploadTooLarge { max_size: u64 },

    /// A blocking engine call panicked or was cancelled
    #[error("Cache task failed: {0}")]
    TaskFailure(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidKey(_) | CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::FileTooLarge { .. } | CacheError::UploadTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::CacheAddFailure(_)
            | CacheError::MetadataWriteFailure(_)
            | CacheError::MetadataReadFailure(_)
            | CacheError::BackendReadFailure(_)
            | CacheError::BackendDeleteFailure(_)
            | CacheError::UnsupportedBackend(_)
            | CacheError::EmptyIndex
            | CacheError::TaskFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache server.
pub type Result<T> = std::result::Result<T, CacheError>;

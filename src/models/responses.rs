//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CacheStats, CacheStatus, EntryMetadata};

/// Response body for a successful upload (POST /:key)
#[derive(Debug, Clone, Serialize)]
pub struct PutResponse {
    pub success: bool,
    /// The key the upload was stored under
    pub key: String,
    /// Free capacity after the upload, in bytes
    pub remaining_bytes: u64,
    pub message: String,
}

impl PutResponse {
    pub fn new(key: impl Into<String>, remaining_bytes: u64) -> Self {
        let key = key.into();
        Self {
            success: true,
            message: format!("Uploaded under {}. {} bytes remain.", key, remaining_bytes),
            key,
            remaining_bytes,
        }
    }
}

/// One row of the status listing
#[derive(Debug, Clone, Serialize)]
pub struct EntryResponse {
    pub key: String,
    pub display_name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
}

impl From<(String, EntryMetadata)> for EntryResponse {
    fn from((key, entry): (String, EntryMetadata)) -> Self {
        Self {
            key,
            display_name: entry.display_name,
            size: entry.size,
            created_at: entry.created_at,
            last_access_at: entry.last_access_at,
        }
    }
}

/// Response body for the status page (GET /)
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub entry_count: usize,
    pub total_content_size: u64,
    pub max_size: u64,
    pub remaining_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Least recently used first
    pub entries: Vec<EntryResponse>,
}

impl StatusResponse {
    pub fn new(status: CacheStatus, stats: &CacheStats, entries: Vec<EntryResponse>) -> Self {
        Self {
            entry_count: status.entry_count,
            total_content_size: status.total_content_size,
            max_size: status.max_size,
            remaining_bytes: status.remaining_bytes(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            hit_rate: stats.hit_rate(),
            entries,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

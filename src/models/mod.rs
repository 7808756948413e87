//! Response models for the cache server API
//!
//! This module defines the DTOs (Data Transfer Objects) serialized into
//! HTTP response bodies. Uploads arrive as multipart forms and are read
//! directly by the handlers.

pub mod responses;

// Re-export commonly used types
pub use responses::{EntryResponse, HealthResponse, PutResponse, StatusResponse};

//! Cache Module
//!
//! Provides a size-bounded blob cache with durable metadata and LRU eviction.

pub mod backend;
mod engine;
mod metadata;
mod recency;
mod stats;


// Re-export public types
pub use backend::{BackendKind, FilesystemBackend, MemoryBackend, StorageBackend};
pub use engine::{validate_key, CacheEngine, CacheStatus};
pub use metadata::{EntryMetadata, MetadataError, MetadataStore};
pub use recency::RecencyIndex;
pub use stats::CacheStats;

// == Public Constants ==
/// Maximum allowed key length in bytes (a single file name)
pub const MAX_KEY_LENGTH: usize = 255;

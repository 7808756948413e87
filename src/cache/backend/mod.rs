//! Storage Backend Module
//!
//! Pluggable blob storage. The engine only sees the `StorageBackend` trait;
//! which implementation sits behind it is decided once at startup.

mod filesystem;
mod memory;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use filesystem::FilesystemBackend;
pub use memory::MemoryBackend;

use crate::error::CacheError;

// == Backend Error ==
/// Error type for backend blob operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("failed to write blob '{key}': {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read blob '{key}': {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to delete blob '{key}': {source}")]
    Delete {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("backend io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

// == Storage Backend Trait ==
/// Raw byte storage addressed by cache key.
///
/// `store` must replace an existing blob atomically: a reader sees either the
/// old bytes or the new bytes, never a mix.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn store(&mut self, key: &str, content: &[u8]) -> BackendResult<()>;

    fn fetch(&self, key: &str) -> BackendResult<Vec<u8>>;

    /// Deleting an absent key yields `BackendError::NotFound`.
    fn delete(&mut self, key: &str) -> BackendResult<()>;

    /// Keys of every blob currently held.
    fn keys(&self) -> BackendResult<Vec<String>>;
}

// == Backend Kind ==
/// Backends selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Filesystem,
    InMemory,
}

impl BackendKind {
    /// Builds the selected backend. `location` is only used by the filesystem backend.
    pub fn create(self, location: &Path) -> crate::error::Result<Box<dyn StorageBackend>> {
        match self {
            BackendKind::Filesystem => {
                let backend = FilesystemBackend::new(location).map_err(|e| {
                    CacheError::UnsupportedBackend(format!(
                        "filesystem backend unavailable at {}: {}",
                        location.display(),
                        e
                    ))
                })?;
                Ok(Box::new(backend))
            }
            BackendKind::InMemory => Ok(Box::new(MemoryBackend::new())),
        }
    }
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filesystem" | "fs" => Ok(BackendKind::Filesystem),
            "memory" | "in-memory" | "inmemory" => Ok(BackendKind::InMemory),
            other => Err(CacheError::UnsupportedBackend(other.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Filesystem => write!(f, "filesystem"),
            BackendKind::InMemory => write!(f, "memory"),
        }
    }
}

//! In-memory blob storage, used for tests and throwaway deployments.

use std::collections::HashMap;

use super::{BackendError, BackendResult, StorageBackend};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn store(&mut self, key: &str, content: &[u8]) -> BackendResult<()> {
        self.blobs.insert(key.to_string(), content.to_vec());
        Ok(())
    }

    fn fetch(&self, key: &str) -> BackendResult<Vec<u8>> {
        self.blobs
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    fn delete(&mut self, key: &str) -> BackendResult<()> {
        self.blobs
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(key.to_string()))
    }

    fn keys(&self) -> BackendResult<Vec<String>> {
        Ok(self.blobs.keys().cloned().collect())
    }
}

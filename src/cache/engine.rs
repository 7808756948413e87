//! Cache Engine Module
//!
//! Keeps the recency index, the durable metadata store and the blob backend
//! consistent while enforcing the byte capacity with LRU eviction.
//!
//! The engine is not internally synchronised: callers hold it behind a
//! single lock so that every `put`/`get` runs start to finish without
//! interleaving.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::backend::{BackendError, StorageBackend};
use crate::cache::metadata::{EntryMetadata, MetadataStore};
use crate::cache::{CacheStats, RecencyIndex, MAX_KEY_LENGTH};
use crate::error::{CacheError, Result};

// == Cache Status ==
/// Point-in-time occupancy of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub entry_count: usize,
    pub total_content_size: u64,
    pub max_size: u64,
}

impl CacheStatus {
    pub fn remaining_bytes(&self) -> u64 {
        self.max_size.saturating_sub(self.total_content_size)
    }
}

// == Key Validation ==
/// Checks that `key` is non-empty and usable as a single file name.
///
/// Leading dots are reserved for the filesystem backend's temporary files.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("Key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if key.starts_with('.') {
        return Err(CacheError::InvalidKey(format!(
            "Key '{}' cannot start with '.'",
            key
        )));
    }
    if key.contains(['/', '\\', '\0']) {
        return Err(CacheError::InvalidKey(format!(
            "Key '{}' contains a path separator or NUL byte",
            key.escape_debug()
        )));
    }
    Ok(())
}

// == Cache Engine ==
/// Bounded-capacity blob cache with LRU eviction.
#[derive(Debug)]
pub struct CacheEngine {
    /// Capacity in bytes, fixed at construction
    max_size: u64,
    /// Sum of the sizes of all indexed entries
    total_content_size: u64,
    recency: RecencyIndex,
    metadata: MetadataStore,
    backend: Box<dyn StorageBackend>,
    stats: CacheStats,
}

impl CacheEngine {
    // == Constructor ==
    /// Builds an engine over existing durable state.
    ///
    /// The recency order is rebuilt from persisted access times, which only
    /// approximates the order before the restart. If the reloaded content no
    /// longer fits in `max_size`, the oldest entries are evicted.
    pub fn open(
        max_size: u64,
        metadata: MetadataStore,
        backend: Box<dyn StorageBackend>,
    ) -> Result<Self> {
        let records = metadata
            .load_all()
            .map_err(|e| CacheError::MetadataReadFailure(e.to_string()))?;

        let mut ordered: Vec<(String, EntryMetadata)> = records.into_iter().collect();
        ordered.sort_by(|(key_a, a), (key_b, b)| {
            a.last_access_at
                .cmp(&b.last_access_at)
                .then_with(|| key_a.cmp(key_b))
        });

        let mut recency = RecencyIndex::new();
        let mut total_content_size = 0;
        for (key, entry) in &ordered {
            recency.insert(key);
            total_content_size += entry.size;
        }

        let mut engine = Self {
            max_size,
            total_content_size,
            recency,
            metadata,
            backend,
            stats: CacheStats::new(),
        };

        if engine.total_content_size > engine.max_size {
            warn!(
                "Reloaded content ({} bytes) exceeds capacity ({} bytes), evicting",
                engine.total_content_size, engine.max_size
            );
            engine.evict_until_fits(None)?;
        }

        info!(
            "Cache opened: {} entries, {}/{} bytes, backend={}",
            engine.recency.len(),
            engine.total_content_size,
            engine.max_size,
            engine.backend.name()
        );
        Ok(engine)
    }

    // == Put ==
    /// Stores `content` under `key`, replacing any previous version.
    ///
    /// The previous version is unlinked before the new blob is written, so a
    /// failed overwrite can only be rolled back while the backend still holds
    /// the old blob. Returns the number of bytes left free.
    pub fn put(&mut self, key: &str, content: &[u8], display_name: &str) -> Result<u64> {
        validate_key(key)?;

        let size = content.len() as u64;
        if size > self.max_size {
            return Err(CacheError::FileTooLarge {
                size,
                max_size: self.max_size,
            });
        }

        let now = Utc::now();
        let previous = self.detach(key)?;

        if let Err(e) = self.backend.store(key, content) {
            error!("Backend {} failed to store '{}': {}", self.backend.name(), key, e);
            if let Some(old) = previous {
                self.reattach(key, old);
            }
            return Err(CacheError::CacheAddFailure(e.to_string()));
        }

        // creation time survives overwrites
        let entry = match previous {
            Some(mut old) => {
                old.size = size;
                old.display_name = display_name.to_string();
                old.touch(now);
                old
            }
            None => EntryMetadata::new(size, display_name, now),
        };

        if let Err(e) = self.metadata.put(key, &entry) {
            error!("Failed to persist metadata for '{}': {}", key, e);
            // Nothing references the new blob now
            if let Err(del) = self.backend.delete(key) {
                warn!("Left orphaned blob '{}': {}", key, del);
            }
            return Err(CacheError::MetadataWriteFailure(e.to_string()));
        }
        self.recency.insert(key);
        self.total_content_size += size;

        self.evict_until_fits(Some(key))?;

        debug!(
            "Stored '{}' ({} bytes), {}/{} bytes used",
            key, size, self.total_content_size, self.max_size
        );
        Ok(self.max_size - self.total_content_size)
    }

    // == Get ==
    /// Returns the display name and content stored under `key`, marking it
    /// most recently used.
    pub fn get(&mut self, key: &str) -> Result<(String, Vec<u8>)> {
        if !self.recency.touch(key) {
            self.stats.record_miss();
            return Err(CacheError::NotFound(key.to_string()));
        }

        let Some(mut entry) = self.metadata.get(key).cloned() else {
            error!("Key '{}' is indexed but has no metadata", key);
            return Err(CacheError::MetadataReadFailure(key.to_string()));
        };

        entry.touch(Utc::now());
        if let Err(e) = self.metadata.put(key, &entry) {
            warn!("Failed to persist access time for '{}': {}", key, e);
        }

        match self.backend.fetch(key) {
            Ok(content) => {
                self.stats.record_hit();
                debug!("Served '{}' ({} bytes)", key, content.len());
                Ok((entry.display_name, content))
            }
            Err(BackendError::NotFound(_)) => {
                error!(
                    "Blob for '{}' missing from {} backend despite metadata",
                    key,
                    self.backend.name()
                );
                Err(CacheError::BackendReadFailure(format!(
                    "blob for '{}' is missing",
                    key
                )))
            }
            Err(e) => {
                error!("Failed to read '{}': {}", key, e);
                Err(CacheError::BackendReadFailure(e.to_string()))
            }
        }
    }

    // == Status ==
    pub fn status(&self) -> CacheStatus {
        CacheStatus {
            entry_count: self.recency.len(),
            total_content_size: self.total_content_size,
            max_size: self.max_size,
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    /// Lists entries from least to most recently used.
    pub fn entries(&self) -> Vec<(String, EntryMetadata)> {
        self.recency
            .iter()
            .filter_map(|key| {
                self.metadata
                    .get(key)
                    .map(|entry| (key.to_string(), entry.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.recency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recency.is_empty()
    }

    // == Sweep Orphans ==
    /// Deletes blobs that no entry refers to.
    ///
    /// A blob whose durable record outlived a failed eviction is kept; it
    /// becomes live again on the next reload. Every orphan is attempted even
    /// if some deletes fail. Returns the number of blobs reclaimed.
    pub fn sweep_orphans(&mut self) -> Result<usize> {
        let keys = self
            .backend
            .keys()
            .map_err(|e| CacheError::BackendReadFailure(e.to_string()))?;

        let mut reclaimed = 0;
        let mut failures = Vec::new();
        for key in keys {
            if self.recency.contains(&key) || self.metadata.get(&key).is_some() {
                continue;
            }
            match self.backend.delete(&key) {
                Ok(()) => {
                    debug!("Reclaimed orphaned blob '{}'", key);
                    reclaimed += 1;
                }
                Err(BackendError::NotFound(_)) => {}
                Err(e) => {
                    warn!("Failed to reclaim orphaned blob '{}': {}", key, e);
                    failures.push(key);
                }
            }
        }

        if !failures.is_empty() {
            return Err(CacheError::BackendDeleteFailure(format!(
                "{} orphaned blobs could not be deleted ({} reclaimed): {}",
                failures.len(),
                reclaimed,
                failures.join(", ")
            )));
        }
        Ok(reclaimed)
    }

    /// Unlinks an existing entry from metadata, index and size accounting.
    fn detach(&mut self, key: &str) -> Result<Option<EntryMetadata>> {
        if !self.recency.contains(key) {
            return Ok(None);
        }
        let Some(old) = self.metadata.get(key).cloned() else {
            error!("Key '{}' is indexed but has no metadata", key);
            return Err(CacheError::MetadataReadFailure(key.to_string()));
        };

        self.metadata
            .delete(key)
            .map_err(|e| CacheError::MetadataWriteFailure(e.to_string()))?;
        self.recency.remove(key);
        self.total_content_size -= old.size;
        Ok(Some(old))
    }

    /// Undoes `detach` after a failed write.
    fn reattach(&mut self, key: &str, old: EntryMetadata) {
        match self.metadata.put(key, &old) {
            Ok(()) => {
                self.recency.insert(key);
                self.total_content_size += old.size;
                info!("Restored previous version of '{}'", key);
            }
            Err(e) => error!("Failed to restore metadata for '{}', entry lost: {}", key, e),
        }
    }

    /// Evicts least recently used entries until the content fits.
    ///
    /// `protected` is the entry being written by the current `put`; it can only
    /// come up for eviction if it alone exceeds capacity, which `put` rejects
    /// up front.
    fn evict_until_fits(&mut self, protected: Option<&str>) -> Result<()> {
        while self.total_content_size > self.max_size {
            let Some(oldest) = self.recency.peek_oldest() else {
                error!(
                    "Over capacity ({} > {} bytes) with nothing left to evict",
                    self.total_content_size, self.max_size
                );
                return Err(CacheError::EmptyIndex);
            };

            debug_assert_ne!(
                protected,
                Some(oldest),
                "entry being written was chosen for eviction"
            );
            if protected == Some(oldest) {
                error!("Entry '{}' being written was chosen for eviction", oldest);
                return Err(CacheError::EmptyIndex);
            }

            let victim = self.recency.evict_oldest()?;
            self.evict_entry(&victim);
        }
        Ok(())
    }

    /// Drops metadata first, then the blob. A crash in between leaves an
    /// orphaned blob for the sweep, never metadata without content.
    fn evict_entry(&mut self, key: &str) {
        let size = match self.metadata.get(key) {
            Some(entry) => entry.size,
            None => {
                error!("Evicted key '{}' had no metadata", key);
                0
            }
        };
        self.total_content_size -= size;
        self.stats.record_eviction();

        if let Err(e) = self.metadata.delete(key) {
            warn!("Failed to delete metadata for evicted '{}', keeping blob: {}", key, e);
            return;
        }

        match self.backend.delete(key) {
            Ok(()) => debug!("Evicted '{}' ({} bytes)", key, size),
            Err(BackendError::NotFound(_)) => {
                debug!("Evicted '{}' had no blob to delete", key);
            }
            Err(e) => warn!("Left orphaned blob for evicted '{}': {}", key, e),
        }
    }

    /// Panics if the index, metadata and size accounting disagree.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let durable = self.metadata.load_all().unwrap();
        let mut durable_keys: Vec<&str> = durable.keys().map(String::as_str).collect();
        let mut indexed: Vec<&str> = self.recency.iter().collect();
        durable_keys.sort_unstable();
        indexed.sort_unstable();
        assert_eq!(indexed, durable_keys, "index and durable metadata diverged");

        let summed: u64 = self
            .recency
            .iter()
            .map(|key| self.metadata.get(key).map_or(0, |m| m.size))
            .sum();
        assert_eq!(self.total_content_size, summed, "size accounting drifted");
        assert!(self.total_content_size <= self.max_size, "over capacity");
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::{BackendResult, FilesystemBackend, MemoryBackend};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn engine(max_size: u64) -> CacheEngine {
        CacheEngine::open(
            max_size,
            MetadataStore::in_memory().unwrap(),
            Box::new(MemoryBackend::new()),
        )
        .unwrap()
    }

    fn blob(len: usize) -> Vec<u8> {
        vec![b'x'; len]
    }

    /// Memory backend whose writes and deletes can be switched off from the test.
    #[derive(Debug, Default)]
    struct FlakyBackend {
        blobs: HashMap<String, Vec<u8>>,
        fail_writes: Arc<AtomicBool>,
        fail_deletes: Arc<AtomicBool>,
    }

    impl StorageBackend for FlakyBackend {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn store(&mut self, key: &str, content: &[u8]) -> BackendResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(BackendError::Write {
                    key: key.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
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
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(BackendError::Delete {
                    key: key.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                });
            }
            self.blobs
                .remove(key)
                .map(|_| ())
                .ok_or_else(|| BackendError::NotFound(key.to_string()))
        }

        fn keys(&self) -> BackendResult<Vec<String>> {
            Ok(self.blobs.keys().cloned().collect())
        }
    }

    #[test]
    fn test_engine_new() {
        let engine = engine(100);
        assert!(engine.is_empty());
        assert_eq!(
            engine.status(),
            CacheStatus {
                entry_count: 0,
                total_content_size: 0,
                max_size: 100
            }
        );
    }

    #[test]
    fn test_put_and_get() {
        let mut engine = engine(100);

        let remaining = engine.put("report", b"hello", "report.txt").unwrap();
        assert_eq!(remaining, 95);

        let (name, content) = engine.get("report").unwrap();
        assert_eq!(name, "report.txt");
        assert_eq!(content, b"hello");
        engine.assert_consistent();
    }

    #[test]
    fn test_get_missing_is_repeatable() {
        let mut engine = engine(100);
        engine.put("a", &blob(10), "a").unwrap();

        for _ in 0..3 {
            assert!(matches!(engine.get("missing"), Err(CacheError::NotFound(_))));
        }

        assert_eq!(engine.status().total_content_size, 10);
        assert_eq!(engine.stats().misses, 3);
        engine.assert_consistent();
    }

    #[test]
    fn test_invalid_keys() {
        let mut engine = engine(100);

        for key in ["", ".hidden", "a/b", "a\\b", "nul\0byte"] {
            assert!(
                matches!(engine.put(key, b"x", "x"), Err(CacheError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
        let long_key = "k".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            engine.put(&long_key, b"x", "x"),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_file_too_large_leaves_state_unchanged() {
        let mut engine = engine(100);
        engine.put("a", &blob(60), "a").unwrap();

        let result = engine.put("b", &blob(101), "b");
        assert!(matches!(
            result,
            Err(CacheError::FileTooLarge {
                size: 101,
                max_size: 100
            })
        ));

        // Same key as an existing entry must not disturb it either
        assert!(engine.put("a", &blob(101), "a").is_err());

        assert_eq!(engine.status().total_content_size, 60);
        assert_eq!(engine.get("a").unwrap().1.len(), 60);
        engine.assert_consistent();
    }

    #[test]
    fn test_exact_capacity_fits() {
        let mut engine = engine(100);
        assert_eq!(engine.put("full", &blob(100), "full").unwrap(), 0);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_overwrite_replaces_size() {
        let mut engine = engine(100);

        engine.put("k", &blob(30), "v1.txt").unwrap();
        let created = engine.entries()[0].1.created_at;
        let remaining = engine.put("k", &blob(50), "v2.txt").unwrap();

        assert_eq!(remaining, 50);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.status().total_content_size, 50);

        let (key, entry) = &engine.entries()[0];
        assert_eq!(key, "k");
        assert_eq!(entry.size, 50);
        assert_eq!(entry.display_name, "v2.txt");
        assert_eq!(entry.created_at, created);
        assert!(entry.last_access_at >= created);
        engine.assert_consistent();
    }

    #[test]
    fn test_overwrite_does_not_double_count() {
        let mut engine = engine(100);

        engine.put("a", &blob(40), "a").unwrap();
        engine.put("b", &blob(40), "b").unwrap();
        // 40 + 40 + 60 would overflow if the old "b" were still counted
        engine.put("b", &blob(60), "b").unwrap();

        assert!(engine.get("a").is_ok());
        assert_eq!(engine.status().total_content_size, 100);
        assert_eq!(engine.stats().evictions, 0);
    }

    #[test]
    fn test_lru_eviction_scenario() {
        let mut engine = engine(100);

        assert_eq!(engine.put("a", &blob(40), "a").unwrap(), 60);
        assert_eq!(engine.put("b", &blob(40), "b").unwrap(), 20);
        assert_eq!(engine.put("c", &blob(40), "c").unwrap(), 20);

        assert!(matches!(engine.get("a"), Err(CacheError::NotFound(_))));
        assert!(engine.get("b").is_ok());
        assert!(engine.get("c").is_ok());
        assert_eq!(engine.stats().evictions, 1);
        engine.assert_consistent();
    }

    #[test]
    fn test_get_refreshes_recency() {
        let mut engine = engine(100);

        engine.put("a", &blob(40), "a").unwrap();
        engine.put("b", &blob(40), "b").unwrap();
        engine.get("a").unwrap();
        assert_eq!(engine.put("c", &blob(40), "c").unwrap(), 20);

        assert!(engine.get("a").is_ok());
        assert!(matches!(engine.get("b"), Err(CacheError::NotFound(_))));
        engine.assert_consistent();
    }

    #[test]
    fn test_touched_entry_outlives_older_ones() {
        let mut engine = engine(100);

        engine.put("A", &blob(20), "A").unwrap();
        engine.put("B", &blob(20), "B").unwrap();
        engine.put("C", &blob(20), "C").unwrap();
        engine.get("B").unwrap();

        // D needs 30 bytes beyond the 40 free: A goes first, then C
        engine.put("D", &blob(70), "D").unwrap();

        assert!(engine.get("A").is_err());
        assert!(engine.get("C").is_err());
        assert!(engine.get("B").is_ok());
        assert!(engine.get("D").is_ok());
        engine.assert_consistent();
    }

    #[test]
    fn test_large_put_evicts_many() {
        let mut engine = engine(100);

        for i in 0..10 {
            engine.put(&format!("k{}", i), &blob(10), "k").unwrap();
        }
        assert_eq!(engine.put("big", &blob(95), "big").unwrap(), 5);

        assert_eq!(engine.len(), 1);
        assert_eq!(engine.stats().evictions, 10);
        engine.assert_consistent();
    }

    #[test]
    fn test_entries_in_recency_order() {
        let mut engine = engine(100);

        engine.put("a", b"1", "a").unwrap();
        engine.put("b", b"2", "b").unwrap();
        engine.put("c", b"3", "c").unwrap();
        engine.get("a").unwrap();

        let keys: Vec<String> = engine.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_backend_failure_rolls_back_overwrite() {
        let fail_writes = Arc::new(AtomicBool::new(false));
        let mut engine = CacheEngine::open(
            100,
            MetadataStore::in_memory().unwrap(),
            Box::new(FlakyBackend {
                fail_writes: fail_writes.clone(),
                ..Default::default()
            }),
        )
        .unwrap();

        engine.put("k", b"original", "orig.txt").unwrap();
        fail_writes.store(true, Ordering::SeqCst);

        let result = engine.put("k", b"replacement", "new.txt");
        assert!(matches!(result, Err(CacheError::CacheAddFailure(_))));

        fail_writes.store(false, Ordering::SeqCst);
        let (name, content) = engine.get("k").unwrap();
        assert_eq!(name, "orig.txt");
        assert_eq!(content, b"original");
        assert_eq!(engine.status().total_content_size, 8);
        engine.assert_consistent();
    }

    #[test]
    fn test_backend_failure_on_new_key() {
        let mut engine = CacheEngine::open(
            100,
            MetadataStore::in_memory().unwrap(),
            Box::new(FlakyBackend {
                fail_writes: Arc::new(AtomicBool::new(true)),
                ..Default::default()
            }),
        )
        .unwrap();

        assert!(matches!(
            engine.put("k", b"data", "k"),
            Err(CacheError::CacheAddFailure(_))
        ));
        assert!(engine.is_empty());
        assert!(matches!(engine.get("k"), Err(CacheError::NotFound(_))));
        engine.assert_consistent();
    }

    #[test]
    fn test_missing_blob_is_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = CacheEngine::open(
            100,
            MetadataStore::in_memory().unwrap(),
            Box::new(FilesystemBackend::new(dir.path()).unwrap()),
        )
        .unwrap();

        engine.put("k", b"data", "k").unwrap();
        std::fs::remove_file(dir.path().join("k")).unwrap();

        assert!(matches!(
            engine.get("k"),
            Err(CacheError::BackendReadFailure(_))
        ));
    }

    #[test]
    fn test_reopen_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("meta.redb");
        let blobs = dir.path().join("blobs");

        {
            let mut engine = CacheEngine::open(
                100,
                MetadataStore::open(&db_path).unwrap(),
                Box::new(FilesystemBackend::new(&blobs).unwrap()),
            )
            .unwrap();
            engine.put("a", &blob(30), "a.bin").unwrap();
            engine.put("b", &blob(20), "b.bin").unwrap();
        }

        let mut engine = CacheEngine::open(
            100,
            MetadataStore::open(&db_path).unwrap(),
            Box::new(FilesystemBackend::new(&blobs).unwrap()),
        )
        .unwrap();

        assert_eq!(engine.status().entry_count, 2);
        assert_eq!(engine.status().total_content_size, 50);
        let (name, content) = engine.get("a").unwrap();
        assert_eq!(name, "a.bin");
        assert_eq!(content.len(), 30);
        engine.assert_consistent();
    }

    #[test]
    fn test_reopen_with_smaller_capacity_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("meta.redb");
        let blobs = dir.path().join("blobs");

        {
            let mut engine = CacheEngine::open(
                100,
                MetadataStore::open(&db_path).unwrap(),
                Box::new(FilesystemBackend::new(&blobs).unwrap()),
            )
            .unwrap();
            engine.put("old", &blob(40), "old").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
            engine.put("new", &blob(40), "new").unwrap();
        }

        let mut engine = CacheEngine::open(
            50,
            MetadataStore::open(&db_path).unwrap(),
            Box::new(FilesystemBackend::new(&blobs).unwrap()),
        )
        .unwrap();

        assert_eq!(engine.len(), 1);
        assert!(engine.get("new").is_ok());
        assert!(!blobs.join("old").exists());
        engine.assert_consistent();
    }

    #[test]
    fn test_sweep_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = CacheEngine::open(
            100,
            MetadataStore::in_memory().unwrap(),
            Box::new(FilesystemBackend::new(dir.path()).unwrap()),
        )
        .unwrap();

        engine.put("live", b"keep me", "live").unwrap();
        std::fs::write(dir.path().join("stray"), b"left over").unwrap();

        assert_eq!(engine.sweep_orphans().unwrap(), 1);
        assert!(!dir.path().join("stray").exists());
        assert!(engine.get("live").is_ok());
        assert_eq!(engine.sweep_orphans().unwrap(), 0);
    }

    /// Engine over a redb file and a blob directory, both under `dir`.
    fn durable_engine(dir: &std::path::Path, max_size: u64) -> CacheEngine {
        CacheEngine::open(
            max_size,
            MetadataStore::open(dir.join("meta.redb")).unwrap(),
            Box::new(FilesystemBackend::new(dir.join("blobs")).unwrap()),
        )
        .unwrap()
    }

    #[test]
    fn test_metadata_write_failure_discards_blob() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = durable_engine(dir.path(), 100);
        engine
            .metadata
            .faults()
            .fail_puts
            .store(true, Ordering::SeqCst);

        let result = engine.put("k", b"data", "k.txt");

        assert!(matches!(result, Err(CacheError::MetadataWriteFailure(_))));
        assert!(!dir.path().join("blobs").join("k").exists());
        assert!(engine.is_empty());
        assert_eq!(engine.status().total_content_size, 0);
        assert!(matches!(engine.get("k"), Err(CacheError::NotFound(_))));
    }

    #[test]
    fn test_access_time_failure_still_serves_content() {
        let mut engine = engine(100);
        engine.put("a", &blob(10), "a.bin").unwrap();
        engine.put("b", &blob(10), "b.bin").unwrap();
        let before = engine.metadata.get("a").unwrap().last_access_at;

        let faults = engine.metadata.faults();
        faults.fail_puts.store(true, Ordering::SeqCst);
        let (name, content) = engine.get("a").unwrap();

        assert_eq!(name, "a.bin");
        assert_eq!(content.len(), 10);
        assert_eq!(engine.stats().hits, 1);
        // Recency still moves even though the access time was not persisted
        let keys: Vec<String> = engine.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(engine.metadata.get("a").unwrap().last_access_at, before);

        faults.fail_puts.store(false, Ordering::SeqCst);
        engine.assert_consistent();
    }

    #[test]
    fn test_failed_eviction_delete_keeps_blob_across_sweep_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let blobs = dir.path().join("blobs");

        {
            let mut engine = durable_engine(dir.path(), 100);
            engine.put("a", &blob(40), "a.bin").unwrap();
            engine.put("b", &blob(40), "b.bin").unwrap();
            engine
                .metadata
                .faults()
                .fail_deletes
                .store(true, Ordering::SeqCst);

            assert_eq!(engine.put("c", &blob(40), "c.bin").unwrap(), 20);
            assert!(matches!(engine.get("a"), Err(CacheError::NotFound(_))));
            assert_eq!(engine.stats().evictions, 1);
            assert!(blobs.join("a").exists());

            // The durable record still points at the blob, so it is not an orphan
            assert_eq!(engine.sweep_orphans().unwrap(), 0);
            assert!(blobs.join("a").exists());
        }

        let mut engine = durable_engine(dir.path(), 200);
        assert_eq!(engine.sweep_orphans().unwrap(), 0);
        let (name, content) = engine.get("a").unwrap();
        assert_eq!(name, "a.bin");
        assert_eq!(content.len(), 40);
        assert_eq!(engine.status().total_content_size, 120);
        engine.assert_consistent();
    }

    #[test]
    fn test_sweep_reports_delete_failures() {
        let fail_deletes = Arc::new(AtomicBool::new(false));
        let backend = FlakyBackend {
            blobs: HashMap::from([("stray".to_string(), b"left over".to_vec())]),
            fail_deletes: fail_deletes.clone(),
            ..Default::default()
        };
        let mut engine =
            CacheEngine::open(100, MetadataStore::in_memory().unwrap(), Box::new(backend))
                .unwrap();
        engine.put("live", b"keep", "live").unwrap();

        fail_deletes.store(true, Ordering::SeqCst);
        assert!(matches!(
            engine.sweep_orphans(),
            Err(CacheError::BackendDeleteFailure(_))
        ));

        fail_deletes.store(false, Ordering::SeqCst);
        assert_eq!(engine.sweep_orphans().unwrap(), 1);
        assert!(engine.get("live").is_ok());
    }
}

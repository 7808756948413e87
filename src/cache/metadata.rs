//! Metadata Store Module
//!
//! Durable per-entry metadata backed by redb. Every write is its own
//! committed transaction, so a successful `put` or `delete` survives a crash
//! and a failed one leaves the previous record untouched. Reads are served
//! from an in-memory copy that is only updated after a commit succeeds.

use std::collections::HashMap;
use std::path::Path;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Key -> JSON-encoded `EntryMetadata`
const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

// == Entry Metadata ==
/// Metadata describing one stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Blob size in bytes
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
    /// Name handed back to clients on retrieval
    pub display_name: String,
}

impl EntryMetadata {
    /// Creates metadata for a fresh entry; both timestamps start at `now`.
    pub fn new(size: u64, display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            size,
            created_at: now,
            last_access_at: now,
            display_name: display_name.into(),
        }
    }

    /// Records an access, never moving the timestamp backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_access_at = self.last_access_at.max(now);
    }
}

// == Errors ==
/// Error type for metadata store operations
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("redb error: {0}")]
    Database(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("metadata codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for MetadataError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// Switches that make durable writes fail before they reach the database.
///
/// A failed redb commit poisons the whole database, so faults are injected
/// per operation here instead of at the storage layer.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MetadataFaults {
    pub fail_puts: AtomicBool,
    pub fail_deletes: AtomicBool,
}

#[cfg(test)]
impl MetadataFaults {
    fn check(flag: &AtomicBool) -> MetadataResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(MetadataError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected metadata failure",
            )));
        }
        Ok(())
    }
}

// == Metadata Store ==
/// Durable key -> metadata table.
///
/// Owns the database handle; dropping the store closes the database.
pub struct MetadataStore {
    db: Database,
    entries: HashMap<String, EntryMetadata>,
    #[cfg(test)]
    faults: Arc<MetadataFaults>,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl MetadataStore {
    /// Opens (or creates) the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Database::create(path)?)
    }

    /// Opens a non-durable store kept entirely in memory.
    pub fn in_memory() -> MetadataResult<Self> {
        let db = redb::Builder::new().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> MetadataResult<Self> {
        // Create the table eagerly so read transactions never miss it
        let write_txn = db.begin_write()?;
        {
            let _table = write_txn.open_table(ENTRIES)?;
        }
        write_txn.commit()?;

        let mut store = Self {
            db,
            entries: HashMap::new(),
            #[cfg(test)]
            faults: Arc::default(),
        };
        store.entries = store.load_all()?;
        Ok(store)
    }

    // == Get ==
    /// Returns the record for `key`, or `None` when absent.
    pub fn get(&self, key: &str) -> Option<&EntryMetadata> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn faults(&self) -> Arc<MetadataFaults> {
        self.faults.clone()
    }

    // == Put ==
    /// Creates or replaces the record for `key`.
    pub fn put(&mut self, key: &str, metadata: &EntryMetadata) -> MetadataResult<()> {
        let bytes = serde_json::to_vec(metadata)?;
        #[cfg(test)]
        MetadataFaults::check(&self.faults.fail_puts)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES)?;
            table.insert(key, bytes.as_slice())?;
        }
        write_txn.commit()?;
        self.entries.insert(key.to_string(), metadata.clone());
        Ok(())
    }

    // == Delete ==
    /// Removes the record for `key`. Deleting an absent key succeeds.
    pub fn delete(&mut self, key: &str) -> MetadataResult<()> {
        #[cfg(test)]
        MetadataFaults::check(&self.faults.fail_deletes)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES)?;
            table.remove(key)?;
        }
        write_txn.commit()?;
        self.entries.remove(key);
        Ok(())
    }

    // == Load All ==
    /// Reads every durable record. Undecodable records are logged and skipped.
    pub fn load_all(&self) -> MetadataResult<HashMap<String, EntryMetadata>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES)?;
        let mut result = HashMap::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let key = key.value().to_string();
            match serde_json::from_slice::<EntryMetadata>(value.value()) {
                Ok(metadata) => {
                    result.insert(key, metadata);
                }
                Err(e) => error!("Failed to decode metadata for '{}': {}", key, e),
            }
        }
        Ok(result)
    }
}

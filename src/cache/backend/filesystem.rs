//! Filesystem blob storage: one file per key inside a root directory.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use tracing::debug;

use super::{BackendError, BackendResult, StorageBackend};

/// Prefix of in-flight upload files; never a valid key.
const TEMP_PREFIX: &str = ".upload-";

#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Opens the backend, creating the root directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> BackendResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl StorageBackend for FilesystemBackend {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    /// Writes into a temp file in the same directory, syncs it, then renames
    /// it over the target.
    fn store(&mut self, key: &str, content: &[u8]) -> BackendResult<()> {
        let write_err = |source: std::io::Error| BackendError::Write {
            key: key.to_string(),
            source,
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.root)
            .map_err(write_err)?;
        tmp.write_all(content).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(self.blob_path(key))
            .map_err(|e| write_err(e.error))?;

        debug!("Stored {} bytes at {}", content.len(), self.blob_path(key).display());
        Ok(())
    }

    fn fetch(&self, key: &str) -> BackendResult<Vec<u8>> {
        fs::read(self.blob_path(key)).map_err(|source| match source.kind() {
            ErrorKind::NotFound => BackendError::NotFound(key.to_string()),
            _ => BackendError::Read {
                key: key.to_string(),
                source,
            },
        })
    }

    fn delete(&mut self, key: &str) -> BackendResult<()> {
        fs::remove_file(self.blob_path(key)).map_err(|source| match source.kind() {
            ErrorKind::NotFound => BackendError::NotFound(key.to_string()),
            _ => BackendError::Delete {
                key: key.to_string(),
                source,
            },
        })
    }

    fn keys(&self) -> BackendResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            // Dot files are in-flight uploads or foreign files, not blobs
            match entry.file_name().into_string() {
                Ok(name) if !name.starts_with('.') => keys.push(name),
                _ => {}
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a").join("b");

        let backend = FilesystemBackend::new(&root).unwrap();

        assert!(root.is_dir());
        assert!(backend.keys().unwrap().is_empty());
    }

    #[test]
    fn test_store_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FilesystemBackend::new(dir.path()).unwrap();

        backend.store("photo", b"\x89PNG...").unwrap();

        assert_eq!(backend.fetch("photo").unwrap(), b"\x89PNG...");
        assert_eq!(fs::read(dir.path().join("photo")).unwrap(), b"\x89PNG...");
    }

    #[test]
    fn test_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FilesystemBackend::new(dir.path()).unwrap();

        backend.store("k", b"first version").unwrap();
        backend.store("k", b"v2").unwrap();

        assert_eq!(backend.fetch("k").unwrap(), b"v2");
        // No temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_fetch_missing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).unwrap();

        assert!(matches!(backend.fetch("nope"), Err(BackendError::NotFound(_))));
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FilesystemBackend::new(dir.path()).unwrap();

        backend.store("k", b"data").unwrap();
        backend.delete("k").unwrap();

        assert!(!dir.path().join("k").exists());
        assert!(matches!(backend.delete("k"), Err(BackendError::NotFound(_))));
    }

    #[test]
    fn test_keys_skip_dot_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FilesystemBackend::new(dir.path()).unwrap();

        backend.store("a", b"1").unwrap();
        backend.store("b", b"2").unwrap();
        fs::write(dir.path().join(".upload-stale"), b"partial").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        let mut keys = backend.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }
}

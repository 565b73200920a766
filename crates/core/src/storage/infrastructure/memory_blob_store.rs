use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::storage::domain::blob_store::{BlobStore, StoreError};

/// Blob store held entirely in memory. `locate` returns the key unchanged,
/// so it suits detectors that never touch the filesystem.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), bytes.into());
        self
    }

    pub fn keys(&self) -> Vec<PathBuf> {
        let mut keys: Vec<PathBuf> = self
            .blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl BlobStore for MemoryBlobStore {
    fn exists(&self, key: &Path) -> bool {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn read(&self, key: &Path) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_path_buf()))
    }

    fn write(&self, key: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    fn locate(&self, key: &Path) -> PathBuf {
        key.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_overwrites() {
        let store = MemoryBlobStore::new().with("a.jpg", b"old".to_vec());
        store.write(Path::new("a.jpg"), b"new").unwrap();
        assert_eq!(store.read(Path::new("a.jpg")).unwrap(), b"new");
        assert_eq!(store.keys(), vec![PathBuf::from("a.jpg")]);
    }

    #[test]
    fn test_missing_key_not_found() {
        let store = MemoryBlobStore::new();
        assert!(!store.exists(Path::new("a.jpg")));
        assert!(matches!(
            store.read(Path::new("a.jpg")),
            Err(StoreError::NotFound(_))
        ));
    }
}

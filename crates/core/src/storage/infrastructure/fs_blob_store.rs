use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::storage::domain::blob_store::{BlobStore, StoreError};

/// Blob store rooted at a directory on the local filesystem.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn checked(&self, key: &Path) -> Result<PathBuf, StoreError> {
        let escapes = key
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || key.as_os_str().is_empty() {
            return Err(StoreError::InvalidKey(key.to_path_buf()));
        }
        Ok(self.root.join(key))
    }
}

impl BlobStore for FsBlobStore {
    fn exists(&self, key: &Path) -> bool {
        self.checked(key).map(|p| p.is_file()).unwrap_or(false)
    }

    fn read(&self, key: &Path) -> Result<Vec<u8>, StoreError> {
        let path = self.checked(key)?;
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(key.to_path_buf()),
            _ => StoreError::Io { path, source: e },
        })
    }

    fn write(&self, key: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.checked(key)?;
        let io_err = |e| StoreError::Io {
            path: path.clone(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&path, bytes).map_err(io_err)
    }

    fn locate(&self, key: &Path) -> PathBuf {
        self.root.join(key)
    }
}

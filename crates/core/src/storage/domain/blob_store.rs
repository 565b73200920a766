use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no blob stored under {0}")]
    NotFound(PathBuf),
    #[error("storage key must be relative and stay inside the store: {0}")]
    InvalidKey(PathBuf),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Key-addressed byte storage for uploaded media and rendered results.
///
/// Keys are relative paths such as `markers/7/photo.jpg`.
pub trait BlobStore: Send + Sync {
    fn exists(&self, key: &Path) -> bool;

    fn read(&self, key: &Path) -> Result<Vec<u8>, StoreError>;

    fn write(&self, key: &Path, bytes: &[u8]) -> Result<(), StoreError>;

    /// Path a detector can open to read the blob directly.
    fn locate(&self, key: &Path) -> PathBuf;
}

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("model file {name} not found in {models_root} or the user cache")]
    NotFound { name: String, models_root: PathBuf },
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Where to look for model weights.
#[derive(Clone, Debug)]
pub struct ModelLocations {
    pub models_root: PathBuf,
    /// Per-user download cache; `None` disables it.
    pub cache_dir: Option<PathBuf>,
    /// Weights missing locally are fetched from `{base_url}/{name}`.
    pub base_url: Option<String>,
}

impl ModelLocations {
    pub fn new(models_root: impl Into<PathBuf>) -> Self {
        Self {
            models_root: models_root.into(),
            cache_dir: model_cache_dir(),
            base_url: None,
        }
    }
}

/// Resolve a model file by name.
///
/// Resolution order:
/// 1. Configured models root
/// 2. User cache directory
/// 3. Download from `base_url` into the cache, if configured
pub fn resolve(
    name: &str,
    locations: &ModelLocations,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let local = locations.models_root.join(name);
    if local.exists() {
        return Ok(local);
    }

    if let Some(ref cache_dir) = locations.cache_dir {
        let cached = cache_dir.join(name);
        if cached.exists() {
            return Ok(cached);
        }
        if let Some(ref base_url) = locations.base_url {
            fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
            let url = format!("{}/{name}", base_url.trim_end_matches('/'));
            log::info!("Downloading model {name} from {url}");
            download(&url, &cached, progress)?;
            return Ok(cached);
        }
    }

    Err(ModelResolveError::NotFound {
        name: name.to_string(),
        models_root: locations.models_root.clone(),
    })
}

/// Platform-specific model cache directory, e.g. `~/.cache/WarTrace/models/`.
pub fn model_cache_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir().map(|d| d.join("WarTrace").join("models"))
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir().map(|d| d.join("WarTrace").join("models"))
    }
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);

    // Never leave a truncated .part behind.
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }

    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<ProgressFn>,
) -> Result<(), ModelResolveError> {
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let write_err = |e| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    };
    let mut file = fs::File::create(temp_path).map_err(write_err)?;

    // Detector weights run to hundreds of MB; stream them.
    let mut reader = response;
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(write_err)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_err)?;
        downloaded += n as u64;
        if let Some(ref cb) = progress {
            cb(downloaded, total);
        }
    }

    file.flush().map_err(write_err)?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn locations(root: &Path, cache: Option<&Path>) -> ModelLocations {
        ModelLocations {
            models_root: root.to_path_buf(),
            cache_dir: cache.map(Path::to_path_buf),
            base_url: None,
        }
    }

    #[test]
    fn test_resolve_prefers_models_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("models");
        let cache = tmp.path().join("cache");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&cache).unwrap();
        fs::write(root.join("yolo11m.onnx"), b"root").unwrap();
        fs::write(cache.join("yolo11m.onnx"), b"cache").unwrap();

        let path = resolve("yolo11m.onnx", &locations(&root, Some(&cache)), None).unwrap();
        assert_eq!(path, root.join("yolo11m.onnx"));
    }

    #[test]
    fn test_resolve_falls_back_to_cache() {
        let tmp = TempDir::new().unwrap();
        let cache = tmp.path().join("cache");
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join("emergency_net.onnx"), b"cache").unwrap();

        let path = resolve(
            "emergency_net.onnx",
            &locations(&tmp.path().join("models"), Some(&cache)),
            None,
        )
        .unwrap();
        assert_eq!(path, cache.join("emergency_net.onnx"));
    }

    #[test]
    fn test_resolve_without_download_url_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = resolve("missing.onnx", &locations(tmp.path(), None), None).unwrap_err();
        assert!(matches!(err, ModelResolveError::NotFound { .. }));
        assert!(err.to_string().contains("missing.onnx"));
    }

    #[test]
    fn test_model_cache_dir_is_namespaced() {
        if let Some(dir) = model_cache_dir() {
            assert!(dir.ends_with("WarTrace/models"));
        }
    }

    #[test]
    fn test_download_invalid_url_leaves_no_partial_file() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let result = download("http://invalid.nonexistent.example.com/model", &dest, None);
        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }
}

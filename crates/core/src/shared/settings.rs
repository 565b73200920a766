use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use crate::shared::detector_type::DetectorType;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-detector adjustments applied on top of the built-in model table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorOverride {
    pub detector_type: DetectorType,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub iou_threshold: Option<f32>,
    #[serde(default)]
    pub model_file: Option<String>,
    /// Leave the detector out of the registry entirely.
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Directory holding the model weights.
    pub models_root: PathBuf,
    /// Root of the uploaded marker files.
    pub media_root: PathBuf,
    /// Root for annotated images and the detections snapshot.
    pub results_root: PathBuf,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// When set, missing weights are fetched from `{model_base_url}/{model_file}`.
    #[serde(default)]
    pub model_base_url: Option<String>,
    #[serde(default)]
    pub overrides: Vec<DetectorOverride>,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            models_root: PathBuf::from("models"),
            media_root: PathBuf::from("media"),
            results_root: PathBuf::from("media/detection_results"),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            model_base_url: None,
            overrides: Vec::new(),
        }
    }
}

impl DetectionSettings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("WarTrace").join("detection.json"))
    }

    /// Loads the user config file, falling back to defaults when it is
    /// missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{e}; using default settings");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let write_err = |e| SettingsError::Write {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, json).map_err(write_err)
    }

    pub fn override_for(&self, detector_type: DetectorType) -> Option<&DetectorOverride> {
        self.overrides
            .iter()
            .find(|o| o.detector_type == detector_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = DetectionSettings::default();
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.queue_capacity, 16);
        assert!(settings.overrides.is_empty());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("detection.json");
        fs::write(
            &path,
            r#"{
                "models_root": "/opt/models",
                "media_root": "/srv/media",
                "results_root": "/srv/media/detection_results",
                "overrides": [{"detector_type": "military_detection", "threshold": 0.5}]
            }"#,
        )
        .unwrap();

        let settings = DetectionSettings::load_from(&path).unwrap();
        assert_eq!(settings.models_root, PathBuf::from("/opt/models"));
        assert_eq!(settings.workers, 2);
        let o = settings
            .override_for(DetectorType::MilitaryDetection)
            .unwrap();
        assert_eq!(o.threshold, Some(0.5));
        assert!(!o.disabled);
        assert!(settings
            .override_for(DetectorType::ObjectDetection)
            .is_none());
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("detection.json");
        let mut settings = DetectionSettings::default();
        settings.workers = 4;
        settings.save_to(&path).unwrap();

        assert_eq!(DetectionSettings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("detection.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            DetectionSettings::load_from(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            DetectionSettings::load_from(&tmp.path().join("absent.json")),
            Err(SettingsError::Read { .. })
        ));
    }
}

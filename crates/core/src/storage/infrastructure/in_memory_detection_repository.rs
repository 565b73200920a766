use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::detection::domain::detection::{Detection, NewDetection};
use crate::shared::ids::{DetectionId, FileId};
use crate::storage::domain::blob_store::StoreError;
use crate::storage::domain::detection_repository::DetectionRepository;

/// Detection records kept in memory, with optional JSON snapshots so the
/// CLI can carry results across runs.
pub struct InMemoryDetectionRepository {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    detections: BTreeMap<DetectionId, Detection>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    detections: Vec<Detection>,
}

impl InMemoryDetectionRepository {
    pub fn new() -> Self {
        Self::from_detections(Vec::new())
    }

    fn from_detections(detections: Vec<Detection>) -> Self {
        let next_id = detections.iter().map(|d| d.id.0 + 1).max().unwrap_or(1);
        Self {
            state: Mutex::new(State {
                next_id,
                detections: detections.into_iter().map(|d| (d.id, d)).collect(),
            }),
        }
    }

    /// Loads a snapshot written by [`save_json`](Self::save_json). A missing
    /// file yields an empty repository.
    pub fn load_json(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let json = fs::read_to_string(path).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let snapshot: Snapshot = serde_json::from_str(&json).map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        log::debug!(
            "Loaded {} detections from {}",
            snapshot.detections.len(),
            path.display()
        );
        Ok(Self::from_detections(snapshot.detections))
    }

    pub fn save_json(&self, path: &Path) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            detections: self.all(),
        };
        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        let io_err = |e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, json).map_err(io_err)
    }

    pub fn len(&self) -> usize {
        self.lock().detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryDetectionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionRepository for InMemoryDetectionRepository {
    fn replace(&self, detection: NewDetection) -> Detection {
        let mut state = self.lock();
        state.detections.retain(|_, d| {
            !(d.file_id == detection.file_id && d.detector_type == detection.detector_type)
        });

        let id = DetectionId(state.next_id);
        state.next_id += 1;
        let detection = detection.into_detection(id, Utc::now());
        state.detections.insert(id, detection.clone());
        detection
    }

    fn for_file(&self, file_id: FileId) -> Vec<Detection> {
        let mut found: Vec<Detection> = self
            .lock()
            .detections
            .values()
            .filter(|d| d.file_id == file_id)
            .cloned()
            .collect();
        found.sort_by_key(|d| d.detector_type);
        found
    }

    fn delete_for(&self, file_id: FileId) -> usize {
        let mut state = self.lock();
        let before = state.detections.len();
        state.detections.retain(|_, d| d.file_id != file_id);
        before - state.detections.len()
    }

    fn all(&self) -> Vec<Detection> {
        self.lock().detections.values().cloned().collect()
    }
}

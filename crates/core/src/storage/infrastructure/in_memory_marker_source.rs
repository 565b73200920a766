use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use serde::Deserialize;

use crate::shared::ids::{FileId, MarkerId};
use crate::shared::marker::Marker;
use crate::storage::domain::blob_store::StoreError;
use crate::storage::domain::marker_source::MarkerSource;

/// Markers held in memory, typically loaded from a JSON manifest of the
/// form `{ "markers": [ ... ] }`.
#[derive(Default)]
pub struct InMemoryMarkerSource {
    markers: RwLock<HashMap<MarkerId, Marker>>,
}

#[derive(Deserialize)]
struct Manifest {
    markers: Vec<Marker>,
}

impl InMemoryMarkerSource {
    pub fn new(markers: impl IntoIterator<Item = Marker>) -> Self {
        let source = Self::default();
        for marker in markers {
            source.insert(marker);
        }
        source
    }

    pub fn from_manifest(path: &Path) -> Result<Self, StoreError> {
        let json = fs::read_to_string(path).map_err(|e| StoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let manifest: Manifest = serde_json::from_str(&json).map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        log::debug!(
            "Loaded {} markers from {}",
            manifest.markers.len(),
            path.display()
        );
        Ok(Self::new(manifest.markers))
    }

    /// Adds or replaces a marker. Files are re-owned by the marker and
    /// sorted by creation time.
    pub fn insert(&self, mut marker: Marker) {
        for file in &mut marker.files {
            file.marker_id = marker.id;
        }
        marker.files.sort_by_key(|f| f.created_at);
        self.markers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(marker.id, marker);
    }

    pub fn remove(&self, id: MarkerId) -> Option<Marker> {
        self.markers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }
}

impl MarkerSource for InMemoryMarkerSource {
    fn marker(&self, id: MarkerId) -> Option<Marker> {
        self.markers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn marker_for_file(&self, file_id: FileId) -> Option<Marker> {
        self.markers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|m| m.file(file_id).is_some())
            .cloned()
    }
}

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::detector_type::DetectorType;
use crate::shared::ids::{FileId, MarkerId};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Per-detector enablement switches stored on a marker.
///
/// The aliases accept the field names used by older marker exports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorFlags {
    #[serde(default)]
    pub object_detection: bool,
    #[serde(default, alias = "camouflage_detection")]
    pub military_detection: bool,
    #[serde(default)]
    pub damage_assessment: bool,
    #[serde(default, alias = "thermal_analysis")]
    pub emergency_recognition: bool,
}

impl DetectorFlags {
    pub fn is_enabled(&self, detector_type: DetectorType) -> bool {
        match detector_type {
            DetectorType::ObjectDetection => self.object_detection,
            DetectorType::MilitaryDetection => self.military_detection,
            DetectorType::DamageAssessment => self.damage_assessment,
            DetectorType::EmergencyRecognition => self.emergency_recognition,
        }
    }

    pub fn set(&mut self, detector_type: DetectorType, enabled: bool) {
        match detector_type {
            DetectorType::ObjectDetection => self.object_detection = enabled,
            DetectorType::MilitaryDetection => self.military_detection = enabled,
            DetectorType::DamageAssessment => self.damage_assessment = enabled,
            DetectorType::EmergencyRecognition => self.emergency_recognition = enabled,
        }
    }
}

/// One uploaded image belonging to exactly one marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerFile {
    pub id: FileId,
    /// Filled in from the owning marker when missing from a manifest.
    #[serde(default)]
    pub marker_id: MarkerId,
    /// Storage key inside the media store.
    pub path: PathBuf,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// A reported item on the map. Owned elsewhere; the detection core only
/// reads its flags and files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(flatten)]
    pub flags: DetectorFlags,
    #[serde(default)]
    pub verified: bool,
    /// Files in creation order.
    #[serde(default)]
    pub files: Vec<MarkerFile>,
}

impl Marker {
    pub fn new(id: MarkerId) -> Self {
        Self {
            id,
            title: String::new(),
            coordinates: None,
            flags: DetectorFlags::default(),
            verified: false,
            files: Vec::new(),
        }
    }

    pub fn with_detector(mut self, detector_type: DetectorType) -> Self {
        self.flags.set(detector_type, true);
        self
    }

    /// Appends a file; `created_at` is taken from the previous file so the
    /// vector order stays the creation order.
    pub fn with_file(mut self, id: FileId, path: impl Into<PathBuf>) -> Self {
        let created_at = self
            .files
            .last()
            .map(|f| f.created_at + chrono::Duration::milliseconds(1))
            .unwrap_or_else(Utc::now);
        self.files.push(MarkerFile {
            id,
            marker_id: self.id,
            path: path.into(),
            created_at,
        });
        self
    }

    pub fn file(&self, id: FileId) -> Option<&MarkerFile> {
        self.files.iter().find(|f| f.id == id)
    }
}

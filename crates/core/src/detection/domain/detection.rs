use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detection::domain::finding::Finding;
use crate::shared::detector_type::DetectorType;
use crate::shared::ids::{DetectionId, FileId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionMetadata {
    pub inference_ms: f64,
    pub finding_count: usize,
}

/// Result of running one detector type against one marker file.
///
/// At most one live detection exists per `(file_id, detector_type)`; the
/// repository enforces this on insert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: DetectionId,
    pub file_id: FileId,
    pub detector_type: DetectorType,
    pub model_name: String,
    pub summary: String,
    /// Key of the annotated image inside the results store.
    pub image_path: Option<PathBuf>,
    pub metadata: Option<DetectionMetadata>,
    /// Set when the detector failed; findings are then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub findings: Vec<Finding>,
}

impl Detection {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// A detection that has not been assigned an id yet.
#[derive(Clone, Debug, PartialEq)]
pub struct NewDetection {
    pub file_id: FileId,
    pub detector_type: DetectorType,
    pub model_name: String,
    pub summary: String,
    pub image_path: Option<PathBuf>,
    pub metadata: Option<DetectionMetadata>,
    pub error: Option<String>,
    pub findings: Vec<Finding>,
}

impl NewDetection {
    pub fn into_detection(self, id: DetectionId, created_at: DateTime<Utc>) -> Detection {
        Detection {
            id,
            file_id: self.file_id,
            detector_type: self.detector_type,
            model_name: self.model_name,
            summary: self.summary,
            image_path: self.image_path,
            metadata: self.metadata,
            error: self.error,
            created_at,
            findings: self.findings,
        }
    }
}

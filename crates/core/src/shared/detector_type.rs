use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The closed set of detectors a marker can enable.
///
/// Declaration order is significant: every iteration over detector types
/// (enablement mapping, per-file processing, result listing) follows
/// [`DetectorType::ALL`] so summaries come out in a reproducible order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorType {
    ObjectDetection,
    MilitaryDetection,
    DamageAssessment,
    EmergencyRecognition,
}

/// Output shape produced by a detector type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
    /// Many labelled bounding boxes per image.
    Object,
    /// One score per class, no geometry.
    Classification,
}

impl DetectorType {
    pub const ALL: [DetectorType; 4] = [
        DetectorType::ObjectDetection,
        DetectorType::MilitaryDetection,
        DetectorType::DamageAssessment,
        DetectorType::EmergencyRecognition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorType::ObjectDetection => "object_detection",
            DetectorType::MilitaryDetection => "military_detection",
            DetectorType::DamageAssessment => "damage_assessment",
            DetectorType::EmergencyRecognition => "emergency_recognition",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DetectorType::ObjectDetection => "Object Detection",
            DetectorType::MilitaryDetection => "Military Detection",
            DetectorType::DamageAssessment => "Damage Assessment",
            DetectorType::EmergencyRecognition => "Emergency Recognition",
        }
    }

    pub fn kind(&self) -> DetectorKind {
        match self {
            DetectorType::ObjectDetection | DetectorType::MilitaryDetection => DetectorKind::Object,
            DetectorType::DamageAssessment | DetectorType::EmergencyRecognition => {
                DetectorKind::Classification
            }
        }
    }

    /// Returns the requested types de-duplicated and in declared order.
    pub fn ordered(types: &[DetectorType]) -> Vec<DetectorType> {
        DetectorType::ALL
            .into_iter()
            .filter(|t| types.contains(t))
            .collect()
    }
}

impl fmt::Display for DetectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown detector type: {0}")]
pub struct UnknownDetectorType(pub String);

impl FromStr for DetectorType {
    type Err = UnknownDetectorType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DetectorType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownDetectorType(s.to_string()))
    }
}

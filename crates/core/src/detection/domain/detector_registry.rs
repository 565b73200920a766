use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    CLASSIFIER_INPUT_SIZE, COCO_LABELS, DAMAGE_LABELS, DAMAGE_MODEL_FILE, DAMAGE_MODEL_NAME,
    DEFAULT_IOU_THRESHOLD, EMERGENCY_LABELS, EMERGENCY_MODEL_FILE, EMERGENCY_MODEL_NAME,
    MILITARY_LABELS, MILITARY_MODEL_FILE, MILITARY_MODEL_NAME, OBJECT_INPUT_SIZE,
    OBJECT_MODEL_FILE, OBJECT_MODEL_NAME,
};
use crate::shared::detector_type::DetectorType;
use crate::shared::marker::Marker;
use crate::shared::settings::DetectionSettings;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("no model configured for detector type {0}")]
    NotFound(DetectorType),
}

/// The active model configuration for one detector type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub detector_type: DetectorType,
    pub model_name: String,
    /// Weights file name, resolved against the models root.
    pub model_file: String,
    /// Minimum confidence for an object to be reported.
    pub threshold: f32,
    /// NMS overlap threshold; object detectors only.
    pub iou_threshold: Option<f32>,
    /// Class names by model output index.
    pub labels: Vec<String>,
    pub description: String,
    pub input_size: u32,
}

impl DetectorConfig {
    /// Class name for a model output index; unknown indices become `class_{i}`.
    pub fn label_for(&self, index: usize) -> String {
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("class_{index}"))
    }

    pub fn builtin(detector_type: DetectorType) -> Self {
        let labels = |l: &[&str]| l.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match detector_type {
            DetectorType::ObjectDetection => Self {
                detector_type,
                model_name: OBJECT_MODEL_NAME.into(),
                model_file: OBJECT_MODEL_FILE.into(),
                threshold: 0.25,
                iou_threshold: Some(DEFAULT_IOU_THRESHOLD),
                labels: labels(COCO_LABELS),
                description: "General object recognition (people, vehicles, etc.)".into(),
                input_size: OBJECT_INPUT_SIZE,
            },
            DetectorType::MilitaryDetection => Self {
                detector_type,
                model_name: MILITARY_MODEL_NAME.into(),
                model_file: MILITARY_MODEL_FILE.into(),
                threshold: 0.3,
                iou_threshold: Some(DEFAULT_IOU_THRESHOLD),
                labels: labels(MILITARY_LABELS),
                description: "Military objects detection (vehicles, weapons, soldiers, etc.)"
                    .into(),
                input_size: OBJECT_INPUT_SIZE,
            },
            DetectorType::DamageAssessment => Self {
                detector_type,
                model_name: DAMAGE_MODEL_NAME.into(),
                model_file: DAMAGE_MODEL_FILE.into(),
                threshold: 0.0,
                iou_threshold: None,
                labels: labels(DAMAGE_LABELS),
                description: "Building damage assessment from satellite imagery".into(),
                input_size: CLASSIFIER_INPUT_SIZE,
            },
            DetectorType::EmergencyRecognition => Self {
                detector_type,
                model_name: EMERGENCY_MODEL_NAME.into(),
                model_file: EMERGENCY_MODEL_FILE.into(),
                threshold: 0.0,
                iou_threshold: None,
                labels: labels(EMERGENCY_LABELS),
                description: "Emergency situation recognition (fire, flood, collapse, etc.)"
                    .into(),
                input_size: CLASSIFIER_INPUT_SIZE,
            },
        }
    }
}

/// Process-wide, immutable lookup from detector type to model configuration.
#[derive(Clone, Debug)]
pub struct DetectorRegistry {
    configs: Vec<DetectorConfig>,
}

impl DetectorRegistry {
    /// Builds a registry from explicit configs; kept in declared type order.
    pub fn new(mut configs: Vec<DetectorConfig>) -> Self {
        configs.sort_by_key(|c| c.detector_type);
        configs.dedup_by_key(|c| c.detector_type);
        Self { configs }
    }

    /// Built-in model table with the settings' overrides applied.
    pub fn from_settings(settings: &DetectionSettings) -> Self {
        let configs = DetectorType::ALL
            .into_iter()
            .filter_map(|detector_type| {
                let mut config = DetectorConfig::builtin(detector_type);
                if let Some(o) = settings.override_for(detector_type) {
                    if o.disabled {
                        return None;
                    }
                    if let Some(threshold) = o.threshold {
                        config.threshold = threshold;
                    }
                    if let Some(iou) = o.iou_threshold {
                        config.iou_threshold = Some(iou);
                    }
                    if let Some(ref file) = o.model_file {
                        config.model_file = file.clone();
                    }
                }
                Some(config)
            })
            .collect();
        Self::new(configs)
    }

    pub fn resolve(&self, detector_type: DetectorType) -> Result<&DetectorConfig, RegistryError> {
        self.configs
            .iter()
            .find(|c| c.detector_type == detector_type)
            .ok_or(RegistryError::NotFound(detector_type))
    }

    /// Detector types switched on for `marker`, always in declared order.
    pub fn enabled_types_for(&self, marker: &Marker) -> Vec<DetectorType> {
        DetectorType::ALL
            .into_iter()
            .filter(|t| marker.flags.is_enabled(*t))
            .collect()
    }

    pub fn configs(&self) -> impl Iterator<Item = &DetectorConfig> {
        self.configs.iter()
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new(
            DetectorType::ALL
                .into_iter()
                .map(DetectorConfig::builtin)
                .collect(),
        )
    }
}

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::detection::domain::detector_registry::DetectorConfig;
use crate::shared::detector_type::DetectorType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    /// Weights missing or the runtime could not load them.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    /// Anything that went wrong while running the model on one image.
    #[error("inference failed: {0}")]
    InferenceFailure(String),
}

/// One box reported by an object-style model, before validation.
#[derive(Clone, Debug, PartialEq)]
pub struct RawObject {
    pub label: String,
    pub confidence: f32,
    /// `[xmin, ymin, xmax, ymax]` in source-image pixels.
    pub bbox: [f32; 4],
}

#[derive(Clone, Debug, PartialEq)]
pub enum InferenceResult {
    Objects(Vec<RawObject>),
    Classes {
        primary_label: String,
        primary_confidence: f32,
        /// Every class score the model produced, primary included.
        all_scores: Vec<(String, f32)>,
    },
}

/// Domain interface for running a model over one image.
///
/// Implementations wrap whatever inference backend is available; callers
/// never branch on which one they got.
pub trait Detector: Send + Sync {
    fn infer(&self, image: &Path, config: &DetectorConfig) -> Result<InferenceResult, DetectorError>;
}

/// Detector implementation per detector type.
#[derive(Clone, Default)]
pub struct DetectorSet {
    detectors: HashMap<DetectorType, Arc<dyn Detector>>,
}

impl DetectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, detector_type: DetectorType, detector: Arc<dyn Detector>) -> Self {
        self.insert(detector_type, detector);
        self
    }

    pub fn insert(&mut self, detector_type: DetectorType, detector: Arc<dyn Detector>) {
        self.detectors.insert(detector_type, detector);
    }

    pub fn get(&self, detector_type: DetectorType) -> Option<&Arc<dyn Detector>> {
        self.detectors.get(&detector_type)
    }

    /// Runs the detector registered for `config.detector_type`.
    ///
    /// An unregistered type is reported as an unavailable model.
    pub fn infer(
        &self,
        image: &Path,
        config: &DetectorConfig,
    ) -> Result<InferenceResult, DetectorError> {
        match self.get(config.detector_type) {
            Some(detector) => detector.infer(image, config),
            None => Err(DetectorError::ModelUnavailable(format!(
                "no detector registered for {}",
                config.detector_type
            ))),
        }
    }
}

//! Whole-image classifier on ONNX Runtime (damage assessment, emergency scenes).
use std::path::Path;
use std::sync::Arc;

use crate::detection::domain::detector::{Detector, DetectorError, InferenceResult};
use crate::detection::domain::detector_registry::DetectorConfig;
use crate::detection::infrastructure::image_tensor::{load_rgb, square_nhwc};
use crate::detection::infrastructure::model_resolver::ModelLocations;
use crate::detection::infrastructure::onnx_session::{cached_session, ModelOutput, SessionCache};

pub struct OnnxClassifier {
    sessions: Arc<SessionCache>,
    locations: ModelLocations,
}

impl OnnxClassifier {
    pub fn new(sessions: Arc<SessionCache>, locations: ModelLocations) -> Self {
        Self {
            sessions,
            locations,
        }
    }
}

impl Detector for OnnxClassifier {
    fn infer(&self, image: &Path, config: &DetectorConfig) -> Result<InferenceResult, DetectorError> {
        let session = cached_session(&self.sessions, &self.locations, config)?;
        let img = load_rgb(image)?;
        let tensor = square_nhwc(&img, config.input_size);

        let output = session
            .run(tensor)
            .map_err(|e| DetectorError::InferenceFailure(e.to_string()))?;

        decode_scores(&output, config)
    }
}

/// Turns a `[1, C]` score vector into the primary class plus every score.
///
/// Logits are normalised with softmax; outputs that already look like
/// probabilities are taken as-is.
fn decode_scores(output: &ModelOutput, config: &DetectorConfig) -> Result<InferenceResult, DetectorError> {
    let classes = output.shape.last().copied().unwrap_or(0);
    if classes == 0 || output.data.len() < classes {
        return Err(DetectorError::InferenceFailure(format!(
            "unexpected classifier output shape: {:?}",
            output.shape
        )));
    }

    let raw = &output.data[..classes];
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(DetectorError::InferenceFailure(
            "classifier produced non-finite scores".into(),
        ));
    }
    let scores = if is_distribution(raw) {
        raw.to_vec()
    } else {
        softmax(raw)
    };

    let (best, best_score) = scores
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

    Ok(InferenceResult::Classes {
        primary_label: config.label_for(best),
        primary_confidence: best_score,
        all_scores: scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| (config.label_for(i), s))
            .collect(),
    })
}

fn is_distribution(values: &[f32]) -> bool {
    let sum: f32 = values.iter().sum();
    values.iter().all(|v| (0.0..=1.0).contains(v)) && (sum - 1.0).abs() < 1e-3
}

fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

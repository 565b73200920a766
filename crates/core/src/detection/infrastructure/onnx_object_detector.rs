//! YOLO-style object detector on ONNX Runtime.
//!
//! Handles letterbox preprocessing, output decoding and class-aware NMS.
//! Boxes are returned in source-image pixels.
use std::path::Path;
use std::sync::Arc;

use crate::detection::domain::detector::{Detector, DetectorError, InferenceResult, RawObject};
use crate::detection::domain::detector_registry::DetectorConfig;
use crate::detection::domain::finding::BoundingBox;
use crate::detection::infrastructure::image_tensor::{letterbox, load_rgb, Letterbox};
use crate::detection::infrastructure::model_resolver::ModelLocations;
use crate::detection::infrastructure::onnx_session::{cached_session, ModelOutput, SessionCache};
use crate::shared::constants::DEFAULT_IOU_THRESHOLD;

pub struct OnnxObjectDetector {
    sessions: Arc<SessionCache>,
    locations: ModelLocations,
}

impl OnnxObjectDetector {
    pub fn new(sessions: Arc<SessionCache>, locations: ModelLocations) -> Self {
        Self {
            sessions,
            locations,
        }
    }
}

impl Detector for OnnxObjectDetector {
    fn infer(&self, image: &Path, config: &DetectorConfig) -> Result<InferenceResult, DetectorError> {
        let session = cached_session(&self.sessions, &self.locations, config)?;
        let img = load_rgb(image)?;
        let (tensor, lb) = letterbox(&img, config.input_size);

        let output = session
            .run(tensor)
            .map_err(|e| DetectorError::InferenceFailure(e.to_string()))?;

        let candidates = decode(&output, config, &lb, (img.width(), img.height()))?;
        let kept = nms(candidates, config.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD));

        Ok(InferenceResult::Objects(
            kept.into_iter()
                .map(|c| RawObject {
                    label: config.label_for(c.class_id),
                    confidence: c.confidence,
                    bbox: [c.bbox.xmin, c.bbox.ymin, c.bbox.xmax, c.bbox.ymax],
                })
                .collect(),
        ))
    }
}

#[derive(Clone, Debug)]
struct Candidate {
    class_id: usize,
    confidence: f32,
    bbox: BoundingBox,
}

/// Decodes `[1, 4 + C, N]` (ultralytics default) or `[1, N, 4 + C]` output.
fn decode(
    output: &ModelOutput,
    config: &DetectorConfig,
    lb: &Letterbox,
    (img_w, img_h): (u32, u32),
) -> Result<Vec<Candidate>, DetectorError> {
    let shape = &output.shape;
    if shape.len() != 3 {
        return Err(DetectorError::InferenceFailure(format!(
            "unexpected detector output shape: {shape:?}"
        )));
    }
    // Fewer features than anchors means the features-major layout.
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 || output.data.len() < num_dets * num_feats {
        return Err(DetectorError::InferenceFailure(format!(
            "detector output too small for shape {shape:?}"
        )));
    }

    let at = |det: usize, feat: usize| {
        if transposed {
            output.data[feat * num_dets + det]
        } else {
            output.data[det * num_feats + feat]
        }
    };

    let mut candidates = Vec::new();
    for i in 0..num_dets {
        let (class_id, confidence) = (4..num_feats)
            .map(|f| (f - 4, at(i, f)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
        if confidence < config.threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
        let (x1, y1) = lb.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = lb.to_source(cx + w / 2.0, cy + h / 2.0);
        let clamp_x = |v: f32| v.clamp(0.0, img_w as f32);
        let clamp_y = |v: f32| v.clamp(0.0, img_h as f32);

        if let Some(bbox) = BoundingBox::new(clamp_x(x1), clamp_y(y1), clamp_x(x2), clamp_y(y2)) {
            candidates.push(Candidate {
                class_id,
                confidence,
                bbox,
            });
        }
    }
    Ok(candidates)
}

/// Greedy per-class NMS, highest confidence first.
fn nms(mut candidates: Vec<Candidate>, iou_thresh: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let suppressed = keep.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_thresh
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::detector_type::DetectorType;
    use approx::assert_relative_eq;

    fn config() -> DetectorConfig {
        let mut config = DetectorConfig::builtin(DetectorType::ObjectDetection);
        config.labels = vec!["person".into(), "car".into()];
        config.threshold = 0.25;
        config
    }

    fn identity() -> Letterbox {
        Letterbox {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
        }
    }

    fn candidate(class_id: usize, confidence: f32, x: f32) -> Candidate {
        Candidate {
            class_id,
            confidence,
            bbox: BoundingBox::new(x, 0.0, x + 100.0, 100.0).unwrap(),
        }
    }

    /// `[1, N=8, 4+2]` with the given leading rows, remaining anchors zeroed.
    fn rows_output(rows: &[[f32; 6]]) -> ModelOutput {
        let mut data = vec![0.0f32; 8 * 6];
        for (i, row) in rows.iter().enumerate() {
            data[i * 6..(i + 1) * 6].copy_from_slice(row);
        }
        ModelOutput {
            shape: vec![1, 8, 6],
            data,
        }
    }

    #[test]
    fn test_decode_rows_layout() {
        // One confident car, one below threshold.
        let output = rows_output(&[
            [50.0, 50.0, 20.0, 40.0, 0.1, 0.9],
            [10.0, 10.0, 4.0, 4.0, 0.1, 0.2],
        ]);
        let dets = decode(&output, &config(), &identity(), (640, 640)).unwrap();

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert_relative_eq!(dets[0].confidence, 0.9);
        assert_relative_eq!(dets[0].bbox.xmin, 40.0);
        assert_relative_eq!(dets[0].bbox.ymax, 70.0);
    }

    #[test]
    fn test_decode_features_major_layout() {
        // [1, 6, N=8]; only anchor 3 is confident.
        let n = 8;
        let mut data = vec![0.0f32; 6 * n];
        let set = |data: &mut Vec<f32>, feat: usize, v: f32| data[feat * n + 3] = v;
        set(&mut data, 0, 100.0);
        set(&mut data, 1, 100.0);
        set(&mut data, 2, 50.0);
        set(&mut data, 3, 50.0);
        set(&mut data, 4, 0.8);
        let output = ModelOutput {
            shape: vec![1, 6, n],
            data,
        };

        let dets = decode(&output, &config(), &identity(), (640, 640)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 0);
        assert_relative_eq!(dets[0].bbox.xmin, 75.0);
    }

    #[test]
    fn test_decode_maps_back_through_letterbox_and_clamps() {
        let output = rows_output(&[[10.0, 110.0, 40.0, 20.0, 0.7, 0.0]]);
        let lb = Letterbox {
            scale: 2.0,
            pad_x: 0,
            pad_y: 100,
        };
        let dets = decode(&output, &config(), &lb, (320, 100)).unwrap();

        assert_eq!(dets.len(), 1);
        // x1 = (10 - 20) / 2 = -5, clamped to 0
        assert_relative_eq!(dets[0].bbox.xmin, 0.0);
        assert_relative_eq!(dets[0].bbox.xmax, 15.0);
        assert_relative_eq!(dets[0].bbox.ymin, 0.0);
        assert_relative_eq!(dets[0].bbox.ymax, 10.0);
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        let output = ModelOutput {
            shape: vec![1, 84],
            data: vec![0.0; 84],
        };
        let err = decode(&output, &config(), &identity(), (640, 640)).unwrap_err();
        assert!(matches!(err, DetectorError::InferenceFailure(_)));
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap() {
        let kept = nms(vec![candidate(0, 0.8, 5.0), candidate(0, 0.9, 0.0)], 0.45);
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn test_nms_keeps_overlapping_different_classes() {
        let kept = nms(vec![candidate(0, 0.9, 0.0), candidate(1, 0.8, 5.0)], 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(Vec::new(), 0.45).is_empty());
    }
}

use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates of the source image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoundingBox {
    /// Returns `None` for degenerate or non-finite boxes.
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Option<Self> {
        let finite = [xmin, ymin, xmax, ymax].iter().all(|v| v.is_finite());
        if finite && xmin < xmax && ymin < ymax {
            Some(Self {
                xmin,
                ymin,
                xmax,
                ymax,
            })
        } else {
            None
        }
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.xmin.max(other.xmin);
        let iy1 = self.ymin.max(other.ymin);
        let ix2 = self.xmax.min(other.xmax);
        let iy2 = self.ymax.min(other.ymax);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        let area_a = self.width() * self.height();
        let area_b = other.width() * other.height();
        inter / (area_a + area_b - inter)
    }
}

/// One result row inside a [`Detection`](super::detection::Detection).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    Object {
        label: String,
        confidence: f32,
        bbox: BoundingBox,
    },
    Classification {
        label: String,
        confidence: f32,
    },
}

impl Finding {
    pub fn object(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Finding::Object {
            label: label.into(),
            confidence: clamp_confidence(confidence),
            bbox,
        }
    }

    pub fn classification(label: impl Into<String>, confidence: f32) -> Self {
        Finding::Classification {
            label: label.into(),
            confidence: clamp_confidence(confidence),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Finding::Object { label, .. } | Finding::Classification { label, .. } => label,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Finding::Object { confidence, .. } | Finding::Classification { confidence, .. } => {
                *confidence
            }
        }
    }

    pub fn bbox(&self) -> Option<&BoundingBox> {
        match self {
            Finding::Object { bbox, .. } => Some(bbox),
            Finding::Classification { .. } => None,
        }
    }
}

fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(10.0, 10.0, 10.0, 20.0)]
    #[case(10.0, 10.0, 20.0, 5.0)]
    #[case(30.0, 0.0, 20.0, 10.0)]
    #[case(f32::NAN, 0.0, 20.0, 10.0)]
    fn test_degenerate_boxes_rejected(
        #[case] xmin: f32,
        #[case] ymin: f32,
        #[case] xmax: f32,
        #[case] ymax: f32,
    ) {
        assert!(BoundingBox::new(xmin, ymin, xmax, ymax).is_none());
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 100.0, 100.0).unwrap();
        let b = BoundingBox::new(50.0, 0.0, 150.0, 100.0).unwrap();
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[test]
    fn test_iou_touching_edges_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 50.0, 50.0).unwrap();
        let b = BoundingBox::new(50.0, 0.0, 100.0, 50.0).unwrap();
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    #[rstest]
    #[case(1.3, 1.0)]
    #[case(-0.2, 0.0)]
    #[case(f32::NAN, 0.0)]
    #[case(0.42, 0.42)]
    fn test_confidence_clamped(#[case] raw: f32, #[case] expected: f32) {
        assert_relative_eq!(Finding::classification("fire", raw).confidence(), expected);
    }

    #[test]
    fn test_serialized_shape() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0).unwrap();
        let value = serde_json::to_value(Finding::object("car", 0.5, bbox)).unwrap();
        assert_eq!(value["kind"], "object");
        assert_eq!(value["label"], "car");
        assert_eq!(value["bbox"]["xmax"], 3.0);
        assert!(Finding::classification("fire", 0.5).bbox().is_none());
    }
}

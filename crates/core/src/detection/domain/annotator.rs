use crate::detection::domain::finding::Finding;
use crate::shared::detector_type::DetectorType;

/// Renders a detection result on top of its source image.
pub trait Annotator: Send + Sync {
    /// Takes the encoded source image and returns the encoded annotated
    /// image (JPEG).
    fn annotate(
        &self,
        source: &[u8],
        detector_type: DetectorType,
        findings: &[Finding],
    ) -> Result<Vec<u8>, Box<dyn std::error::Error>>;
}

use crate::detection::domain::detection::{Detection, NewDetection};
use crate::shared::ids::FileId;

/// Owner of persisted detections and their findings.
///
/// Guarantees at most one live detection per `(file_id, detector_type)`.
pub trait DetectionRepository: Send + Sync {
    /// Deletes the live detection for the same file and detector type, if
    /// any, and inserts `detection` in its place as one atomic step.
    fn replace(&self, detection: NewDetection) -> Detection;

    /// Live detections for a file, in detector type order.
    fn for_file(&self, file_id: FileId) -> Vec<Detection>;

    /// Removes every detection of a file. Returns how many were removed.
    fn delete_for(&self, file_id: FileId) -> usize;

    fn all(&self) -> Vec<Detection>;
}

use crate::shared::ids::{FileId, MarkerId};
use crate::shared::marker::Marker;

/// Read-only view of the externally owned markers and their files.
pub trait MarkerSource: Send + Sync {
    fn marker(&self, id: MarkerId) -> Option<Marker>;

    fn marker_for_file(&self, file_id: FileId) -> Option<Marker>;
}

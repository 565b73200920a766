pub mod annotator;
pub mod detection;
pub mod detector;
pub mod detector_registry;
pub mod finding;
pub mod summary;

pub mod blob_store;
pub mod detection_repository;
pub mod marker_source;

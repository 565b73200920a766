pub mod fs_blob_store;
pub mod in_memory_detection_repository;
pub mod in_memory_marker_source;
pub mod memory_blob_store;

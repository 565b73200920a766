pub mod image_processor;
pub mod infrastructure;
pub mod job_executor;
pub mod job_status_store;
pub mod marker_processing_coordinator;

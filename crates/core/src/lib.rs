//! Marker detection coordinator.
//!
//! Runs the detectors a marker has enabled over each of its image files on a
//! small background worker pool, persists one detection per (file, detector
//! type) and exposes per-marker job status for polling.
pub mod detection;
pub mod pipeline;
pub mod shared;
pub mod storage;

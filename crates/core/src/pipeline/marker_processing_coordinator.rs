use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::Serialize;
use thiserror::Error;

use crate::detection::domain::detection::Detection;
use crate::pipeline::image_processor::{Eligibility, ImageProcessor};
use crate::pipeline::job_executor::{panic_message, JobExecutor};
use crate::pipeline::job_status_store::{
    FileOutcome, FileReport, JobStatus, JobStatusStore, ProcessingSummary,
};
use crate::shared::detector_type::DetectorType;
use crate::shared::ids::{FileId, MarkerId};
use crate::shared::marker::MarkerFile;
use crate::storage::domain::marker_source::MarkerSource;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmitError {
    #[error("marker {0} does not exist")]
    UnknownMarker(MarkerId),
    #[error("marker {0} has no detectors enabled")]
    NoDetectorsEnabled(MarkerId),
    #[error("marker {0} is already being processed")]
    AlreadyInProgress(MarkerId),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessFileError {
    #[error("file {0} does not exist")]
    UnknownFile(FileId),
    #[error("no detectors enabled for file {0}")]
    NoDetectorsEnabled(FileId),
}

/// Failures that abort a whole marker job.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("marker {0} disappeared before processing started")]
    MarkerNotFound(MarkerId),
}

/// Result of processing one file synchronously.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileDetectionSummary {
    pub file_id: FileId,
    pub outcome: FileOutcome,
    pub detections: Vec<Detection>,
}

/// Live detections for one marker file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileDetections {
    pub file_id: FileId,
    pub path: PathBuf,
    pub detections: Vec<Detection>,
}

/// Handle to a submitted marker job. Dropping it does not affect the job.
pub struct JobHandle {
    marker_id: MarkerId,
    done: Receiver<JobStatus>,
    statuses: Arc<JobStatusStore>,
}

impl JobHandle {
    pub fn marker_id(&self) -> MarkerId {
        self.marker_id
    }

    /// Blocks until the job reaches a terminal state.
    pub fn wait(self) -> JobStatus {
        self.done
            .recv()
            .unwrap_or_else(|_| self.statuses.get(self.marker_id))
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<JobStatus> {
        match self.done.recv_timeout(timeout) {
            Ok(status) => Some(status),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.statuses.get(self.marker_id)),
        }
    }
}

/// Turns "process this marker" into a background job with pollable status.
///
/// At most one job runs per marker. Files are processed one after another in
/// creation order; independent markers run in parallel on the executor.
pub struct MarkerProcessingCoordinator {
    shared: Arc<Shared>,
    executor: Arc<dyn JobExecutor>,
}

struct Shared {
    processor: ImageProcessor,
    markers: Arc<dyn MarkerSource>,
    statuses: Arc<JobStatusStore>,
}

impl MarkerProcessingCoordinator {
    pub fn new(
        processor: ImageProcessor,
        markers: Arc<dyn MarkerSource>,
        statuses: Arc<JobStatusStore>,
        executor: Arc<dyn JobExecutor>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                processor,
                markers,
                statuses,
            }),
            executor,
        }
    }

    /// Starts processing a marker in the background and returns at once.
    ///
    /// If the executor refuses the job the submission still succeeds, but
    /// the marker's status goes straight to `Error`.
    pub fn submit(&self, marker_id: MarkerId) -> Result<JobHandle, SubmitError> {
        let marker = self
            .shared
            .markers
            .marker(marker_id)
            .ok_or(SubmitError::UnknownMarker(marker_id))?;
        let types = self.shared.processor.registry().enabled_types_for(&marker);
        if types.is_empty() {
            log::info!("Marker {marker_id} has no detectors enabled");
            return Err(SubmitError::NoDetectorsEnabled(marker_id));
        }
        if !self.shared.statuses.try_begin(marker_id) {
            return Err(SubmitError::AlreadyInProgress(marker_id));
        }
        log::info!(
            "Queued marker {marker_id}: {} files, detectors {:?}",
            marker.files.len(),
            types
        );

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let job_tx = done_tx.clone();
        let shared = self.shared.clone();
        let job = Box::new(move || {
            let status = shared.run_job(marker_id);
            let _ = job_tx.send(status);
        });

        if let Err(e) = self.executor.execute(job) {
            log::error!("Could not schedule marker {marker_id}: {e}");
            let message = format!("failed to schedule job: {e}");
            let status = self
                .shared
                .statuses
                .fail(marker_id, message.clone())
                .unwrap_or(JobStatus::Error {
                    progress: 0,
                    message,
                });
            let _ = done_tx.send(status);
        }

        Ok(JobHandle {
            marker_id,
            done: done_rx,
            statuses: self.shared.statuses.clone(),
        })
    }

    pub fn status(&self, marker_id: MarkerId) -> JobStatus {
        self.shared.statuses.get(marker_id)
    }

    /// Processes one file on the calling thread. `None` uses the owning
    /// marker's enabled detectors.
    pub fn process_file(
        &self,
        file_id: FileId,
        detector_types: Option<Vec<DetectorType>>,
    ) -> Result<FileDetectionSummary, ProcessFileError> {
        let marker = self
            .shared
            .markers
            .marker_for_file(file_id)
            .ok_or(ProcessFileError::UnknownFile(file_id))?;
        let file = marker
            .file(file_id)
            .ok_or(ProcessFileError::UnknownFile(file_id))?;

        let types = match detector_types {
            Some(types) => DetectorType::ordered(&types),
            None => self.shared.processor.registry().enabled_types_for(&marker),
        };
        if types.is_empty() {
            return Err(ProcessFileError::NoDetectorsEnabled(file_id));
        }

        let (outcome, detections) = self.shared.process_one(file, &types);
        Ok(FileDetectionSummary {
            file_id,
            outcome,
            detections,
        })
    }

    /// Live detections of every file of a marker, in file order.
    pub fn results(&self, marker_id: MarkerId) -> Result<Vec<FileDetections>, SubmitError> {
        let marker = self
            .shared
            .markers
            .marker(marker_id)
            .ok_or(SubmitError::UnknownMarker(marker_id))?;
        let repository = self.shared.processor.repository();
        Ok(marker
            .files
            .iter()
            .map(|file| FileDetections {
                file_id: file.id,
                path: file.path.clone(),
                detections: repository.for_file(file.id),
            })
            .collect())
    }
}

impl Shared {
    /// Job body. Always leaves the marker in a terminal state and returns the
    /// status this job wrote.
    fn run_job(&self, marker_id: MarkerId) -> JobStatus {
        let started = Instant::now();
        let message = match catch_unwind(AssertUnwindSafe(|| self.process_marker(marker_id, started))) {
            Ok(Ok(summary)) => {
                log::info!(
                    "Marker {marker_id} done: {} processed, {} detections, {} errors, {} skipped in {} ms",
                    summary.processed,
                    summary.detections,
                    summary.errors,
                    summary.skipped,
                    summary.elapsed_ms
                );
                return self
                    .statuses
                    .complete(marker_id, summary.clone())
                    .unwrap_or(JobStatus::Completed {
                        progress: 100,
                        result: summary,
                    });
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("job panicked: {}", panic_message(panic.as_ref())),
        };
        log::error!("Marker {marker_id} failed: {message}");
        self.statuses
            .fail(marker_id, message.clone())
            .unwrap_or(JobStatus::Error {
                progress: 0,
                message,
            })
    }

    fn process_marker(
        &self,
        marker_id: MarkerId,
        started: Instant,
    ) -> Result<ProcessingSummary, JobError> {
        let marker = self
            .markers
            .marker(marker_id)
            .ok_or(JobError::MarkerNotFound(marker_id))?;
        let types = self.processor.registry().enabled_types_for(&marker);
        let total = marker.files.len();

        let mut summary = ProcessingSummary::default();
        for (index, file) in marker.files.iter().enumerate() {
            let (outcome, detections) = self.process_one(file, &types);
            summary.record(FileReport {
                file_id: file.id,
                outcome,
                detections: detections.len(),
            });

            let done = index + 1;
            self.statuses
                .update_progress(marker_id, (done * 100 / total) as u8);
            log::debug!("Marker {marker_id}: {done}/{total} files");
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
    }

    fn process_one(&self, file: &MarkerFile, types: &[DetectorType]) -> (FileOutcome, Vec<Detection>) {
        match self.processor.eligibility(file) {
            Eligibility::Missing => {
                log::warn!("File {} not found: {}", file.id, file.path.display());
                (FileOutcome::Missing, Vec::new())
            }
            Eligibility::Unsupported => {
                log::info!("Skipping unsupported file {}: {}", file.id, file.path.display());
                (FileOutcome::Skipped, Vec::new())
            }
            Eligibility::Ready => {
                let detections = self.processor.process_file(file, types);
                (outcome_of(&detections), detections)
            }
        }
    }
}

fn outcome_of(detections: &[Detection]) -> FileOutcome {
    if detections.iter().any(Detection::is_error) {
        FileOutcome::Failed
    } else if detections.is_empty() {
        FileOutcome::Skipped
    } else {
        FileOutcome::Processed
    }
}

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::shared::ids::{FileId, MarkerId};

/// What happened to one file during a marker job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    /// At least one detector produced a detection without error.
    Processed,
    /// At least one detector failed.
    Failed,
    /// Not a supported image type.
    Skipped,
    /// The file is gone from media storage.
    Missing,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub file_id: FileId,
    pub outcome: FileOutcome,
    pub detections: usize,
}

/// Aggregate result of a finished marker job.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub processed: usize,
    pub detections: usize,
    pub errors: usize,
    pub skipped: usize,
    pub files: Vec<FileReport>,
    pub elapsed_ms: u64,
}

impl ProcessingSummary {
    /// Folds one file's report into the totals. Missing files count as
    /// errors, unsupported ones as skipped.
    pub fn record(&mut self, report: FileReport) {
        match report.outcome {
            FileOutcome::Processed => self.processed += 1,
            FileOutcome::Failed | FileOutcome::Missing => self.errors += 1,
            FileOutcome::Skipped => self.skipped += 1,
        }
        self.detections += report.detections;
        self.files.push(report);
    }
}

/// Per-marker job state as seen by pollers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Processing {
        progress: u8,
    },
    Completed {
        progress: u8,
        result: ProcessingSummary,
    },
    Error {
        progress: u8,
        message: String,
    },
}

impl JobStatus {
    pub fn progress(&self) -> u8 {
        match self {
            JobStatus::Idle => 0,
            JobStatus::Processing { progress }
            | JobStatus::Completed { progress, .. }
            | JobStatus::Error { progress, .. } => *progress,
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, JobStatus::Processing { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed { .. } | JobStatus::Error { .. })
    }
}

/// Current job status per marker.
///
/// Every write swaps the whole entry under the write lock, so a reader sees
/// either the old or the new status. Terminal writes only land on an entry
/// that is still `Processing`.
#[derive(Default)]
pub struct JobStatusStore {
    statuses: RwLock<HashMap<MarkerId, JobStatus>>,
}

impl JobStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Idle` for markers that never had a job.
    pub fn get(&self, marker_id: MarkerId) -> JobStatus {
        self.read()
            .get(&marker_id)
            .cloned()
            .unwrap_or(JobStatus::Idle)
    }

    /// Moves the marker to `Processing { progress: 0 }` unless a job is
    /// already running. Returns whether the caller now owns the job.
    pub fn try_begin(&self, marker_id: MarkerId) -> bool {
        let mut statuses = self.write();
        if statuses
            .get(&marker_id)
            .is_some_and(JobStatus::is_processing)
        {
            return false;
        }
        statuses.insert(marker_id, JobStatus::Processing { progress: 0 });
        true
    }

    /// Raises the progress of a running job. Lower values are ignored.
    pub fn update_progress(&self, marker_id: MarkerId, progress: u8) {
        let progress = progress.min(100);
        let mut statuses = self.write();
        if let Some(JobStatus::Processing { progress: current }) = statuses.get_mut(&marker_id) {
            if progress > *current {
                *current = progress;
            }
        }
    }

    /// Returns the status written, or `None` if no job was running.
    pub fn complete(&self, marker_id: MarkerId, result: ProcessingSummary) -> Option<JobStatus> {
        let mut statuses = self.write();
        if !statuses
            .get(&marker_id)
            .is_some_and(JobStatus::is_processing)
        {
            return None;
        }
        let status = JobStatus::Completed {
            progress: 100,
            result,
        };
        statuses.insert(marker_id, status.clone());
        Some(status)
    }

    /// Records a failed job, keeping the progress reached so far. Returns the
    /// status written, or `None` if no job was running.
    pub fn fail(&self, marker_id: MarkerId, message: impl Into<String>) -> Option<JobStatus> {
        let mut statuses = self.write();
        let progress = match statuses.get(&marker_id) {
            Some(JobStatus::Processing { progress }) => *progress,
            _ => return None,
        };
        let status = JobStatus::Error {
            progress,
            message: message.into(),
        };
        statuses.insert(marker_id, status.clone());
        Some(status)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<MarkerId, JobStatus>> {
        self.statuses.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<MarkerId, JobStatus>> {
        self.statuses.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const M: MarkerId = MarkerId(1);

    #[test]
    fn test_unknown_marker_is_idle() {
        assert_eq!(JobStatusStore::new().get(M), JobStatus::Idle);
    }

    #[test]
    fn test_try_begin_refuses_while_processing() {
        let store = JobStatusStore::new();
        assert!(store.try_begin(M));
        assert!(!store.try_begin(M));
        assert_eq!(store.get(M), JobStatus::Processing { progress: 0 });
    }

    #[test]
    fn test_try_begin_after_terminal_replaces() {
        let store = JobStatusStore::new();
        store.try_begin(M);
        store.fail(M, "boom");
        assert!(store.try_begin(M));
        assert_eq!(store.get(M), JobStatus::Processing { progress: 0 });
    }

    #[test]
    fn test_progress_is_monotonic() {
        let store = JobStatusStore::new();
        store.try_begin(M);
        store.update_progress(M, 50);
        store.update_progress(M, 20);
        assert_eq!(store.get(M).progress(), 50);
        store.update_progress(M, 250);
        assert_eq!(store.get(M).progress(), 100);
    }

    #[test]
    fn test_progress_ignored_unless_processing() {
        let store = JobStatusStore::new();
        store.update_progress(M, 40);
        assert_eq!(store.get(M), JobStatus::Idle);

        store.try_begin(M);
        store.complete(M, ProcessingSummary::default());
        store.update_progress(M, 40);
        assert_eq!(store.get(M).progress(), 100);
    }

    #[test]
    fn test_terminal_state_is_final_for_the_submission() {
        let store = JobStatusStore::new();
        store.try_begin(M);
        store.update_progress(M, 33);
        assert!(store.fail(M, "worker pool rejected job").is_some());

        assert_eq!(store.complete(M, ProcessingSummary::default()), None);
        assert_eq!(store.fail(M, "again"), None);
        assert_eq!(
            store.get(M),
            JobStatus::Error {
                progress: 33,
                message: "worker pool rejected job".into()
            }
        );
    }

    #[test]
    fn test_terminal_write_returns_its_own_status() {
        let store = JobStatusStore::new();
        store.try_begin(M);
        let written = store.complete(M, ProcessingSummary::default());

        // A resubmission right after must not change what the finished job saw.
        assert!(store.try_begin(M));
        assert_eq!(
            written,
            Some(JobStatus::Completed {
                progress: 100,
                result: ProcessingSummary::default()
            })
        );
        assert_eq!(store.get(M), JobStatus::Processing { progress: 0 });
    }

    #[test]
    fn test_summary_record_buckets() {
        let mut summary = ProcessingSummary::default();
        for (id, outcome, detections) in [
            (1, FileOutcome::Processed, 2),
            (2, FileOutcome::Failed, 2),
            (3, FileOutcome::Missing, 0),
            (4, FileOutcome::Skipped, 0),
        ] {
            summary.record(FileReport {
                file_id: FileId(id),
                outcome,
                detections,
            });
        }
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.detections, 4);
        assert_eq!(summary.files.len(), 4);
    }

    #[test]
    fn test_status_json_shape() {
        let json = serde_json::to_value(JobStatus::Processing { progress: 40 }).unwrap();
        assert_eq!(json, serde_json::json!({"state": "processing", "progress": 40}));
        let json = serde_json::to_value(JobStatus::Idle).unwrap();
        assert_eq!(json, serde_json::json!({"state": "idle"}));
    }

    #[test]
    fn test_concurrent_try_begin_has_one_winner() {
        let store = Arc::new(JobStatusStore::new());
        let winners: usize = (0..8)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.try_begin(M))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(winners, 1);
    }
}

use std::any::Any;

use thiserror::Error;

/// A unit of background work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("job queue is full ({capacity} waiting)")]
    QueueFull { capacity: usize },
    #[error("worker pool is shut down")]
    ShutDown,
}

/// Runs jobs off the caller's thread.
///
/// This is a port: the coordinator only needs "accept or reject this job".
/// Infrastructure supplies the concrete pool.
pub trait JobExecutor: Send + Sync {
    /// Queues `job` without blocking. A rejected job is dropped unrun.
    fn execute(&self, job: Job) -> Result<(), ExecutorError>;
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

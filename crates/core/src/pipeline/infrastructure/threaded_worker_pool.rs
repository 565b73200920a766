use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::pipeline::job_executor::{ExecutorError, Job, JobExecutor};

/// Fixed set of worker threads fed from a bounded queue.
///
/// Layout: `execute → [bounded queue] → detect-worker-{0..n}`
///
/// Submission never blocks: a full queue rejects the job. Dropping the pool
/// closes the queue, lets the workers drain what is already queued, then
/// joins them.
pub struct ThreadedWorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    capacity: usize,
}

impl ThreadedWorkerPool {
    pub fn new(workers: usize, queue_capacity: usize) -> std::io::Result<Self> {
        let capacity = queue_capacity.max(1);
        let (sender, receiver) = crossbeam_channel::bounded::<Job>(capacity);

        let workers = (0..workers.max(1))
            .map(|i| spawn_worker(i, receiver.clone()))
            .collect::<std::io::Result<Vec<_>>>()?;
        log::debug!(
            "Started {} detection workers, queue capacity {capacity}",
            workers.len()
        );

        Ok(Self {
            sender: Some(sender),
            workers,
            capacity,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl JobExecutor for ThreadedWorkerPool {
    fn execute(&self, job: Job) -> Result<(), ExecutorError> {
        let sender = self.sender.as_ref().ok_or(ExecutorError::ShutDown)?;
        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => ExecutorError::QueueFull {
                capacity: self.capacity,
            },
            TrySendError::Disconnected(_) => ExecutorError::ShutDown,
        })
    }
}

impl Drop for ThreadedWorkerPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Detection worker thread panicked");
            }
        }
    }
}

fn spawn_worker(index: usize, jobs: Receiver<Job>) -> std::io::Result<JoinHandle<()>> {
    let name = format!("detect-worker-{index}");
    std::thread::Builder::new().name(name.clone()).spawn(move || {
        for job in jobs {
            // A panicking job must not take the worker down with it.
            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                log::error!("Job panicked on {name}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_runs_jobs_on_named_workers() {
        let pool = ThreadedWorkerPool::new(2, 4).unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();

        for _ in 0..3 {
            let tx = tx.clone();
            pool.execute(Box::new(move || {
                let name = std::thread::current().name().map(str::to_string);
                tx.send(name).unwrap();
            }))
            .unwrap();
        }

        for _ in 0..3 {
            let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
            assert!(name.starts_with("detect-worker-"));
        }
        assert_eq!(pool.worker_count(), 2);
    }

    #[test]
    fn test_full_queue_rejects_without_blocking() {
        let pool = ThreadedWorkerPool::new(1, 1).unwrap();
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);

        pool.execute(Box::new(move || {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
        }))
        .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Worker busy: one slot in the queue, then rejection.
        pool.execute(Box::new(|| {})).unwrap();
        assert_eq!(
            pool.execute(Box::new(|| {})),
            Err(ExecutorError::QueueFull { capacity: 1 })
        );

        drop(gate_tx);
    }

    #[test]
    fn test_worker_survives_panicking_job() {
        let pool = ThreadedWorkerPool::new(1, 4).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(1);

        pool.execute(Box::new(|| panic!("detector blew up"))).unwrap();
        pool.execute(Box::new(move || tx.send(42).unwrap())).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_drop_drains_queued_jobs() {
        let ran = Arc::new(AtomicUsize::new(0));
        {
            let pool = ThreadedWorkerPool::new(1, 8).unwrap();
            for _ in 0..5 {
                let ran = ran.clone();
                pool.execute(Box::new(move || {
                    std::thread::sleep(Duration::from_millis(5));
                    ran.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
            }
        }
        assert_eq!(ran.load(Ordering::SeqCst), 5);
    }
}

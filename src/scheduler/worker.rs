//! Export worker threads
//!
//! Each worker:
//! - Pulls tasks from the shared queue
//! - Opens its own archive connection per task
//! - Sends one result per task back to the coordinator
//! - Stops taking tasks once shutdown is requested

use super::queue::TaskReceiver;
use crate::archive::ArchiveConnector;
use crate::error::WorkerError;
use crate::export::{process_task, ExportTask, TaskOutcome, TaskResult};
use crossbeam_channel::Sender;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// PVs exported
    pub exported: AtomicU64,

    /// PVs skipped by policy
    pub skipped: AtomicU64,

    /// PVs that failed
    pub failed: AtomicU64,

    /// Records appended
    pub samples: AtomicU64,
}

impl WorkerStats {
    fn record(&self, result: &TaskResult) {
        match &result.outcome {
            TaskOutcome::Exported { samples, .. } => {
                self.exported.fetch_add(1, Ordering::Relaxed);
                self.samples.fetch_add(*samples, Ordering::Relaxed);
            }
            TaskOutcome::Skipped { .. } => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcome::Failed { .. } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// A worker thread that processes export tasks
pub struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn<C>(
        id: usize,
        connector: Arc<C>,
        tasks: TaskReceiver,
        results: Sender<TaskResult>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, WorkerError>
    where
        C: ArchiveConnector + 'static,
    {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("export-{}", id))
            .spawn(move || worker_loop(id, connector, tasks, results, shutdown, stats_clone))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|payload| WorkerError::Panicked {
                id: self.id,
                message: panic_message(payload.as_ref()),
            }),
            None => Ok(()),
        }
    }
}

/// Main worker loop
fn worker_loop<C: ArchiveConnector>(
    id: usize,
    connector: Arc<C>,
    tasks: TaskReceiver,
    results: Sender<TaskResult>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
) {
    debug!(worker = id, "Worker starting");

    while !shutdown.load(Ordering::Relaxed) {
        let Some(task) = tasks.next_task() else {
            break;
        };

        let result = run_task(id, &task, connector.as_ref());
        stats.record(&result);
        trace!(worker = id, pv = %result.pv_name, success = result.is_success(), "Task finished");

        if results.send(result).is_err() {
            warn!(worker = id, "Result channel closed, stopping");
            break;
        }
    }

    debug!(
        worker = id,
        exported = stats.exported.load(Ordering::Relaxed),
        failed = stats.failed.load(Ordering::Relaxed),
        "Worker finished"
    );
}

/// Run one task, turning a panic into a failed result
fn run_task<C: ArchiveConnector>(id: usize, task: &ExportTask, connector: &C) -> TaskResult {
    match panic::catch_unwind(AssertUnwindSafe(|| process_task(task, connector))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(worker = id, pv = %task.pv_name(), message = %message, "Task panicked");
            TaskResult::failed_with(task.pv_name(), format!("task panicked: {}", message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Aggregate stats from all workers: (exported, skipped, failed, samples)
pub fn aggregate_stats(workers: &[Worker]) -> (u64, u64, u64, u64) {
    let mut exported = 0u64;
    let mut skipped = 0u64;
    let mut failed = 0u64;
    let mut samples = 0u64;

    for worker in workers {
        exported += worker.stats.exported.load(Ordering::Relaxed);
        skipped += worker.stats.skipped.load(Ordering::Relaxed);
        failed += worker.stats.failed.load(Ordering::Relaxed);
        samples += worker.stats.samples.load(Ordering::Relaxed);
    }

    (exported, skipped, failed, samples)
}

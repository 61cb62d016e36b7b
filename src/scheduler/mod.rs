//! Export coordinator - runs export tasks on a pool of worker threads
//!
//! The coordinator is responsible for:
//! - Filling the task queue and spawning workers
//! - Collecting results in completion order
//! - Reporting each result as it arrives
//! - Graceful shutdown on request
//!
//! # Architecture
//!
//! ```text
//!                ┌───────────────────────┐
//!                │   ExportCoordinator   │
//!                │   TaskQueue (filled)  │
//!                └───────────┬───────────┘
//!                            │
//!       ┌────────────────────┼────────────────────┐
//!       │                    │                    │
//! ┌─────▼─────┐        ┌─────▼─────┐        ┌─────▼─────┐
//! │ export-0  │        │ export-1  │        │ export-N  │
//! │ archive   │        │ archive   │        │ archive   │
//! │ conn/task │        │ conn/task │        │ conn/task │
//! └─────┬─────┘        └─────┬─────┘        └─────┬─────┘
//!       └────────────────────┼────────────────────┘
//!                            ▼
//!                   results (completion order)
//! ```

pub mod queue;
pub mod worker;

pub use queue::{TaskQueue, TaskReceiver};
pub use worker::{aggregate_stats, Worker, WorkerStats};

use crate::archive::ArchiveConnector;
use crate::error::Result;
use crate::export::{ExportTask, TaskResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Running totals passed along with each result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunProgress {
    /// PVs exported so far
    pub exported: usize,

    /// PVs failed or skipped so far
    pub failed: usize,

    /// Tasks in this run
    pub total: usize,
}

impl RunProgress {
    pub fn finished(&self) -> usize {
        self.exported + self.failed
    }
}

/// Result of a completed run
#[derive(Debug)]
pub struct RunReport {
    /// Successful tasks in completion order
    pub exported: Vec<TaskResult>,

    /// Skipped and failed tasks in completion order
    pub failed: Vec<TaskResult>,

    /// Tasks submitted
    pub total: usize,

    /// Wall time of the run
    pub duration: Duration,

    /// Whether every task reported (vs was interrupted)
    pub completed: bool,
}

impl RunReport {
    /// Records appended across all PVs
    pub fn samples_written(&self) -> u64 {
        self.exported.iter().map(TaskResult::samples).sum()
    }
}

/// Runs export tasks in parallel
pub struct ExportCoordinator<C> {
    connector: Arc<C>,
    worker_count: usize,
    shutdown: Arc<AtomicBool>,
}

impl<C: ArchiveConnector + 'static> ExportCoordinator<C> {
    /// Create a coordinator with `worker_count` workers
    pub fn new(connector: C, worker_count: usize) -> Self {
        Self {
            connector: Arc::new(connector),
            worker_count: worker_count.max(1),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run every task and collect the results
    ///
    /// `on_result` is called on the calling thread for each result as it
    /// arrives, together with the running totals. Once shutdown is
    /// requested, workers finish their current task and take no new ones.
    pub fn run<F>(&self, tasks: Vec<ExportTask>, mut on_result: F) -> Result<RunReport>
    where
        F: FnMut(&TaskResult, &RunProgress),
    {
        let start = Instant::now();
        let total = tasks.len();

        let queue = TaskQueue::new();
        queue.fill(tasks)?;
        let receiver = queue.close();

        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let workers = self.spawn_workers(&receiver, &result_tx, total)?;
        drop(result_tx);
        drop(receiver);

        let mut exported = Vec::new();
        let mut failed = Vec::new();
        for result in result_rx.iter() {
            let success = result.is_success();
            let progress = RunProgress {
                exported: exported.len() + usize::from(success),
                failed: failed.len() + usize::from(!success),
                total,
            };
            on_result(&result, &progress);

            if success {
                exported.push(result);
            } else {
                failed.push(result);
            }
        }

        let (n_exported, n_skipped, n_failed, samples) = aggregate_stats(&workers);
        for worker in workers {
            if let Err(e) = worker.join() {
                warn!(error = %e, "Worker failed to join cleanly");
            }
        }

        let duration = start.elapsed();
        let completed = exported.len() + failed.len() == total;
        if !completed {
            info!(
                finished = exported.len() + failed.len(),
                total = total,
                "Run interrupted"
            );
        }

        info!(
            exported = n_exported,
            skipped = n_skipped,
            failed = n_failed,
            samples = samples,
            duration_secs = duration.as_secs(),
            "Run completed"
        );

        Ok(RunReport {
            exported,
            failed,
            total,
            duration,
            completed,
        })
    }

    fn spawn_workers(
        &self,
        receiver: &TaskReceiver,
        results: &crossbeam_channel::Sender<TaskResult>,
        total: usize,
    ) -> Result<Vec<Worker>> {
        let count = self.worker_count.min(total.max(1));
        let mut workers = Vec::with_capacity(count);

        for id in 0..count {
            let worker = Worker::spawn(
                id,
                Arc::clone(&self.connector),
                receiver.clone(),
                results.clone(),
                Arc::clone(&self.shutdown),
            );

            match worker {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Stop the workers already running before bailing out
                    self.shutdown.store(true, Ordering::SeqCst);
                    return Err(e.into());
                }
            }
        }

        info!(count = workers.len(), tasks = total, "Workers spawned");
        Ok(workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_finished() {
        let progress = RunProgress {
            exported: 3,
            failed: 2,
            total: 10,
        };
        assert_eq!(progress.finished(), 5);
    }
}

//! Task queue
//!
//! All tasks are known before the first worker starts, so the queue is
//! filled once and then closed. Workers drain it until it is empty.

use crate::error::WorkerError;
use crate::export::ExportTask;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Queue of export tasks
pub struct TaskQueue {
    sender: Sender<ExportTask>,
    receiver: Receiver<ExportTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Enqueue every task
    pub fn fill(&self, tasks: Vec<ExportTask>) -> Result<usize, WorkerError> {
        let mut count = 0;
        for task in tasks {
            self.sender
                .send(task)
                .map_err(|_| WorkerError::QueueSendFailed)?;
            count += 1;
        }
        Ok(count)
    }

    /// Close the queue for sending and return a receiver for the workers
    pub fn close(self) -> TaskReceiver {
        TaskReceiver {
            receiver: self.receiver,
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end handed to each worker
#[derive(Clone)]
pub struct TaskReceiver {
    receiver: Receiver<ExportTask>,
}

impl TaskReceiver {
    /// Take the next task, `None` once the queue is drained
    pub fn next_task(&self) -> Option<ExportTask> {
        self.receiver.recv().ok()
    }
}

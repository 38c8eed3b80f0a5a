mod immediate;
mod pool;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

pub use immediate::ImmediateDispatcher;
pub use pool::WorkerPool;

use crate::{
    error::Result,
    task::{Task, TaskOutcome},
};

/// Runs tasks away from the owning thread and hands them back to it.
///
/// Implementations guarantee that:
/// * at most one task per model is running at any time, in submission order;
/// * a task is only applied after its run has finished, and only from `pump`;
/// * a cancelled task is never applied.
pub trait Dispatcher {
    /// Hands a newly built task over to the dispatcher.
    ///
    /// # Arguments
    /// * `task` - A task that hasn't been queued or run yet.
    ///
    /// # Returns
    /// A ticket to cancel the task with, or the reason it was refused.
    fn submit(&mut self, task: Task) -> Result<TaskTicket>;

    /// Applies every task that finished running since the last call, on the calling thread.
    ///
    /// # Returns
    /// The outcomes of the applied tasks, in the order they finished.
    fn pump(&mut self) -> Vec<TaskOutcome>;

    /// Blocks until every submitted task has either finished running or been discarded.
    fn wait(&mut self);

    /// The amount of submitted tasks that have been neither applied nor discarded.
    fn pending(&self) -> usize;

    /// Waits for every submitted task and applies them.
    fn drain(&mut self) -> Vec<TaskOutcome> {
        self.wait();
        self.pump()
    }
}

impl<D: Dispatcher + ?Sized> Dispatcher for Box<D> {
    fn submit(&mut self, task: Task) -> Result<TaskTicket> {
        (**self).submit(task)
    }

    fn pump(&mut self) -> Vec<TaskOutcome> {
        (**self).pump()
    }

    fn wait(&mut self) {
        (**self).wait()
    }

    fn pending(&self) -> usize {
        (**self).pending()
    }
}

/// The requester's side of a submitted task.
#[derive(Debug, Clone)]
pub struct TaskTicket {
    task_id: u64,
    cancelled: Arc<AtomicBool>,
}

impl TaskTicket {
    /// Creates the ticket of a task, for use by `Dispatcher` implementations.
    pub fn new(task_id: u64) -> Self {
        Self {
            task_id,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    /// Cancels the task.
    ///
    /// A task that hasn't started won't run. A running task is left to finish so its model
    /// is never left half trained, but its result is discarded. Either way it's never applied.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Applies a task that finished running unless its ticket was cancelled.
fn settle(ticket: &TaskTicket, mut task: Task) -> Option<TaskOutcome> {
    if ticket.is_cancelled() {
        log::debug!(task_id = task.id(); "task cancelled, discarding result");
        return None;
    }

    match task.apply() {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            log::warn!(task_id = task.id(); "{e}");
            None
        }
    }
}

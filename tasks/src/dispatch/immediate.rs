use std::collections::VecDeque;

use log::debug;

use super::{Dispatcher, TaskTicket, settle};
use crate::{
    error::Result,
    task::{Task, TaskOutcome},
};

/// Runs every task on the calling thread as soon as it's submitted.
///
/// Results are still held back until `pump`, so the order of run and apply is the same as
/// with a background dispatcher.
#[derive(Debug, Default)]
pub struct ImmediateDispatcher {
    completed: VecDeque<(TaskTicket, Task)>,
}

impl ImmediateDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dispatcher for ImmediateDispatcher {
    fn submit(&mut self, mut task: Task) -> Result<TaskTicket> {
        task.enqueue()?;
        let ticket = TaskTicket::new(task.id());

        task.run()?;
        debug!(task_id = task.id(); "task ran in the foreground");

        self.completed.push_back((ticket.clone(), task));
        Ok(ticket)
    }

    fn pump(&mut self) -> Vec<TaskOutcome> {
        self.completed
            .drain(..)
            .filter_map(|(ticket, task)| settle(&ticket, task))
            .collect()
    }

    fn wait(&mut self) {}

    fn pending(&self) -> usize {
        self.completed.len()
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::{Example, ModelInstance, ModelType};

    use super::*;
    use crate::handle::ModelHandle;

    #[test]
    fn test_results_wait_for_pump() {
        let model = ModelHandle::new(ModelInstance::new(ModelType::Classification));
        let mut dispatcher = ImmediateDispatcher::new();

        let task = Task::training(&model, vec![Example::new(vec![0.0], vec![1.0])]).unwrap();
        dispatcher.submit(task).unwrap();

        assert!(model.is_trained());
        assert_eq!(dispatcher.pending(), 1);

        let outcomes = dispatcher.pump();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].success);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_cancelled_task_is_not_applied() {
        let model = ModelHandle::new(ModelInstance::new(ModelType::Classification));
        let mut dispatcher = ImmediateDispatcher::new();

        let task = Task::training(&model, vec![Example::new(vec![0.0], vec![1.0])]).unwrap();
        let ticket = dispatcher.submit(task).unwrap();
        ticket.cancel();

        assert!(dispatcher.pump().is_empty());
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_run_task_cannot_be_submitted() {
        let model = ModelHandle::new(ModelInstance::new(ModelType::Classification));
        let mut dispatcher = ImmediateDispatcher::new();

        let mut task = Task::sampling(&model, vec![0.0]).unwrap();
        task.run().unwrap();

        assert!(dispatcher.submit(task).is_err());
    }
}

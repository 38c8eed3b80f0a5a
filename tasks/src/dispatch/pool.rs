use std::{
    collections::{HashMap, VecDeque},
    io,
    num::NonZeroUsize,
    sync::Arc,
};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use tokio::{
    runtime::{Builder, Runtime},
    sync::mpsc,
};

use super::{Dispatcher, TaskTicket, settle};
use crate::{
    error::{Result, TaskErr},
    task::{Task, TaskOutcome},
};

/// Tasks waiting to run, one FIFO queue per model id.
///
/// A queue exists only while a lane driver is draining it.
type Lanes = Arc<Mutex<HashMap<u64, VecDeque<(TaskTicket, Task)>>>>;

enum Settled {
    Ran(TaskTicket, Task),
    Skipped(TaskTicket),
}

impl Settled {
    fn ticket(&self) -> &TaskTicket {
        match self {
            Settled::Ran(ticket, _) | Settled::Skipped(ticket) => ticket,
        }
    }
}

/// Runs tasks on a pool of background threads.
///
/// Every model gets its own lane: the tasks submitted against it run one after the other, in
/// submission order, while tasks against different models run in parallel. Finished tasks are
/// sent back through a completion channel and applied by `pump` on the owning thread.
///
/// Dropping the pool cancels every task that hasn't been applied and waits for the running
/// ones to finish.
pub struct WorkerPool {
    runtime: Runtime,
    lanes: Lanes,
    done_tx: mpsc::UnboundedSender<Settled>,
    done_rx: mpsc::UnboundedReceiver<Settled>,
    ready: VecDeque<Settled>,
    outstanding: HashMap<u64, TaskTicket>,
    in_flight: usize,
    max_backlog: Option<NonZeroUsize>,
}

impl WorkerPool {
    /// Creates a new `WorkerPool`.
    ///
    /// # Arguments
    /// * `workers` - The maximum amount of tasks running at the same time.
    /// * `max_backlog` - The maximum amount of tasks waiting on a single model, unbounded if `None`.
    ///
    /// # Returns
    /// The pool or an io error if the threads couldn't be started.
    pub fn new(workers: NonZeroUsize, max_backlog: Option<NonZeroUsize>) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers.get())
            .thread_name("interactml-worker")
            .build()?;

        let (done_tx, done_rx) = mpsc::unbounded_channel();
        info!(workers = workers.get(); "worker pool started");

        Ok(Self {
            runtime,
            lanes: Arc::default(),
            done_tx,
            done_rx,
            ready: VecDeque::new(),
            outstanding: HashMap::new(),
            in_flight: 0,
            max_backlog,
        })
    }

    fn receive(&mut self, settled: Settled) {
        self.in_flight -= 1;
        self.ready.push_back(settled);
    }
}

impl Dispatcher for WorkerPool {
    fn submit(&mut self, mut task: Task) -> Result<TaskTicket> {
        let model_id = task.model().id();
        let mut lanes = self.lanes.lock();

        if let Some(max) = self.max_backlog {
            let backlog = lanes.get(&model_id).map_or(0, VecDeque::len);
            if backlog >= max.get() {
                return Err(TaskErr::Backpressure {
                    model: model_id,
                    backlog,
                });
            }
        }

        task.enqueue()?;
        let ticket = TaskTicket::new(task.id());
        debug!(task_id = task.id(), model_id = model_id; "task queued");

        let idle = !lanes.contains_key(&model_id);
        lanes
            .entry(model_id)
            .or_default()
            .push_back((ticket.clone(), task));
        drop(lanes);

        if idle {
            let lanes = Arc::clone(&self.lanes);
            let done_tx = self.done_tx.clone();
            self.runtime.spawn(drive_lane(model_id, lanes, done_tx));
        }

        self.outstanding.insert(ticket.task_id(), ticket.clone());
        self.in_flight += 1;
        Ok(ticket)
    }

    fn pump(&mut self) -> Vec<TaskOutcome> {
        while let Ok(settled) = self.done_rx.try_recv() {
            self.receive(settled);
        }

        let mut outcomes = Vec::with_capacity(self.ready.len());
        while let Some(settled) = self.ready.pop_front() {
            self.outstanding.remove(&settled.ticket().task_id());

            if let Settled::Ran(ticket, task) = settled {
                outcomes.extend(settle(&ticket, task));
            }
        }

        outcomes
    }

    fn wait(&mut self) {
        while self.in_flight > 0 {
            match self.done_rx.blocking_recv() {
                Some(settled) => self.receive(settled),
                None => break,
            }
        }
    }

    fn pending(&self) -> usize {
        self.in_flight + self.ready.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for ticket in self.outstanding.values() {
            ticket.cancel();
        }

        if !self.outstanding.is_empty() {
            debug!(cancelled = self.outstanding.len(); "worker pool dropped with pending tasks");
        }
    }
}

/// Runs the tasks queued on a model's lane until it's empty.
///
/// # Arguments
/// * `model_id` - The id of the model whose lane to drain.
/// * `lanes` - The lanes shared with the pool.
/// * `done_tx` - Where to send the finished tasks.
async fn drive_lane(model_id: u64, lanes: Lanes, done_tx: mpsc::UnboundedSender<Settled>) {
    while let Some((ticket, mut task)) = next_in_lane(&lanes, model_id) {
        if ticket.is_cancelled() {
            debug!(task_id = ticket.task_id(); "task cancelled before running");
            if done_tx.send(Settled::Skipped(ticket)).is_err() {
                return;
            }
            continue;
        }

        let ret = tokio::task::spawn_blocking(move || {
            let ret = task.run();
            (task, ret)
        })
        .await;

        let settled = match ret {
            Ok((task, Ok(_))) => Settled::Ran(ticket, task),
            Ok((task, Err(e))) => {
                warn!(task_id = task.id(); "{e}");
                Settled::Skipped(ticket)
            }
            Err(e) => {
                error!(model_id = model_id; "worker failed: {e}");
                Settled::Skipped(ticket)
            }
        };

        if done_tx.send(settled).is_err() {
            return;
        }
    }
}

/// Pops the next task of a lane, removing the lane once it's empty.
fn next_in_lane(lanes: &Lanes, model_id: u64) -> Option<(TaskTicket, Task)> {
    let mut lanes = lanes.lock();
    let queue = lanes.get_mut(&model_id)?;

    match queue.pop_front() {
        Some(next) => Some(next),
        None => {
            lanes.remove(&model_id);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use machine_learning::{Example, ModelInstance, ModelType};

    use super::*;
    use crate::handle::ModelHandle;

    fn pool() -> WorkerPool {
        WorkerPool::new(NonZeroUsize::new(2).unwrap(), None).unwrap()
    }

    fn examples() -> Vec<Example> {
        vec![
            Example::new(vec![0.0], vec![0.0]),
            Example::new(vec![1.0], vec![1.0]),
        ]
    }

    #[test]
    fn test_train_then_run_in_submission_order() {
        let model = ModelHandle::new(ModelInstance::new(ModelType::Classification));
        let mut pool = pool();

        pool.submit(Task::training(&model, examples()).unwrap()).unwrap();
        pool.submit(Task::sampling(&model, vec![0.8]).unwrap()).unwrap();

        let outcomes = pool.drain();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].success);
        assert_eq!(outcomes[1].outputs, vec![vec![1.0]]);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_cancelled_task_is_discarded() {
        let model = ModelHandle::new(ModelInstance::new(ModelType::Classification));
        let applied = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&applied);
        let mut pool = pool();

        pool.submit(Task::training(&model, examples()).unwrap()).unwrap();
        let ticket = pool
            .submit(
                Task::sampling(&model, vec![0.0])
                    .unwrap()
                    .on_applied(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
            )
            .unwrap();
        ticket.cancel();

        let outcomes = pool.drain();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(applied.load(Ordering::SeqCst), 0);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_full_backlog_is_refused() {
        let model = ModelHandle::new(ModelInstance::new(ModelType::Regression));
        let mut pool = WorkerPool::new(NonZeroUsize::MIN, NonZeroUsize::new(1)).unwrap();

        let slow: Vec<Example> = (0..200)
            .map(|i| Example::new(vec![i as f32], vec![(i % 7) as f32]))
            .collect();

        // The first task may already be running, but at most one of the others can wait.
        let results: Vec<_> = (0..3)
            .map(|_| pool.submit(Task::training(&model, slow.clone()).unwrap()))
            .collect();

        assert!(results.iter().any(|ret| matches!(ret, Err(TaskErr::Backpressure { .. }))));
        pool.drain();
    }
}

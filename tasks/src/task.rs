use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use log::{debug, warn};
use machine_learning::{Example, Model, ModelState};
use parking_lot::Mutex;

use crate::{
    error::{Result, TaskErr, TaskFailure},
    handle::ModelHandle,
};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

/// A model state shared between its owner and the tasks that sample with it.
pub type SharedContext = Arc<Mutex<ModelState>>;

type Callback = Box<dyn FnOnce(&TaskOutcome) + Send>;

/// The operation a task performs on its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    None,
    Train,
    Run,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Train => write!(f, "train"),
            Self::Run => write!(f, "run"),
        }
    }
}

/// Where a task is in its single pass from the requesting thread to a worker and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Created,
    Queued,
    Running,
    Completed,
    Applied,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Applied => write!(f, "applied"),
        }
    }
}

impl TaskStatus {
    /// Returns `true` if no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Returns `true` if moving from this status to `next` is valid.
    ///
    /// A task may be run without being queued first, every other step is taken in order.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Queued)
                | (Self::Created | Self::Queued, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Completed, Self::Applied)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Payload {
    Empty,
    Examples(Vec<Example>),
    Inputs(Vec<f32>),
    Series(Vec<Vec<f32>>),
}

/// What the owning thread receives when a task is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub task_id: u64,
    pub kind: TaskKind,
    pub success: bool,
    /// One output vector per sampled input, empty for training and on failure.
    pub outputs: Vec<Vec<f32>>,
    pub failure: Option<TaskFailure>,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl TaskOutcome {
    /// The outputs concatenated in order.
    pub fn flat_outputs(&self) -> Vec<f32> {
        self.outputs.concat()
    }

    /// How long the task ran on its worker.
    pub fn elapsed(&self) -> Option<Duration> {
        Some(self.finished_at?.saturating_duration_since(self.started_at?))
    }
}

/// A single train or run operation against a model.
///
/// A task is built on the requesting thread, run exactly once on a worker and applied exactly
/// once back on the requesting thread. Running touches nothing but the model and the context.
pub struct Task {
    id: u64,
    kind: TaskKind,
    model: ModelHandle,
    context: Option<Weak<Mutex<ModelState>>>,
    payload: Payload,
    status: TaskStatus,
    success: bool,
    outputs: Vec<Vec<f32>>,
    failure: Option<TaskFailure>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    callback: Option<Callback>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("model", &self.model.id())
            .field("status", &self.status)
            .field("success", &self.success)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

impl Task {
    /// Creates a new `Task` with no inputs.
    ///
    /// # Arguments
    /// * `model` - The model the task operates on.
    /// * `kind` - The operation to perform.
    ///
    /// # Returns
    /// The new task, or `InvalidArgument` if there's no model.
    pub fn new(model: Option<ModelHandle>, kind: TaskKind) -> Result<Self> {
        let model = model.ok_or(TaskErr::InvalidArgument("a task needs a model"))?;

        Ok(Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            model,
            context: None,
            payload: Payload::Empty,
            status: TaskStatus::Created,
            success: false,
            outputs: Vec::new(),
            failure: None,
            started_at: None,
            finished_at: None,
            callback: None,
        })
    }

    /// Creates a training task for `model`.
    pub fn training(model: &ModelHandle, examples: Vec<Example>) -> Result<Self> {
        Self::new(Some(model.clone()), TaskKind::Train)?.with_examples(examples)
    }

    /// Creates a task that samples `model` once.
    pub fn sampling(model: &ModelHandle, inputs: Vec<f32>) -> Result<Self> {
        Self::new(Some(model.clone()), TaskKind::Run)?.with_inputs(inputs)
    }

    /// Creates a task that samples `model` once per element of `series`, in order.
    pub fn series(model: &ModelHandle, series: Vec<Vec<f32>>) -> Result<Self> {
        Self::new(Some(model.clone()), TaskKind::Run)?.with_input_series(series)
    }

    /// Sets the training set of a `Train` task.
    pub fn with_examples(self, examples: Vec<Example>) -> Result<Self> {
        self.with_payload(TaskKind::Train, Payload::Examples(examples))
    }

    /// Sets the single feature vector of a `Run` task.
    pub fn with_inputs(self, inputs: Vec<f32>) -> Result<Self> {
        self.with_payload(TaskKind::Run, Payload::Inputs(inputs))
    }

    /// Sets the feature vectors a `Run` task samples in order.
    ///
    /// # Arguments
    /// * `series` - The feature vectors, at least one.
    pub fn with_input_series(self, series: Vec<Vec<f32>>) -> Result<Self> {
        if series.is_empty() {
            return Err(TaskErr::InvalidArgument("an input series needs at least one element"));
        }

        self.with_payload(TaskKind::Run, Payload::Series(series))
    }

    /// Binds the task to a model state without keeping it alive.
    ///
    /// The state has to outlive the task's run, otherwise sampling fails.
    pub fn with_context(mut self, context: &SharedContext) -> Self {
        self.context = Some(Arc::downgrade(context));
        self
    }

    /// Sets the function that receives the outcome when the task is applied.
    pub fn on_applied<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&TaskOutcome) + Send + 'static,
    {
        self.callback = Some(Box::new(f));
        self
    }

    /// Sets a function bound to `owner` that receives the outcome when the task is applied.
    ///
    /// Only a weak reference to the owner is kept. If the owner is gone by the time the task
    /// is applied, the function is dropped without being called.
    pub fn on_applied_for<O, F>(mut self, owner: &Arc<O>, f: F) -> Self
    where
        O: Send + Sync + 'static,
        F: FnOnce(&O, &TaskOutcome) + Send + 'static,
    {
        let owner = Arc::downgrade(owner);
        let task_id = self.id;

        self.callback = Some(Box::new(move |outcome| match owner.upgrade() {
            Some(owner) => f(&owner, outcome),
            None => debug!(task_id = task_id; "owner dropped, discarding outcome"),
        }));
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn outputs(&self) -> &[Vec<f32>] {
        &self.outputs
    }

    /// The outputs concatenated in order.
    pub fn flat_outputs(&self) -> Vec<f32> {
        self.outputs.concat()
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        self.failure.as_ref()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    /// Marks the task as handed to a dispatcher.
    pub(crate) fn enqueue(&mut self) -> Result<()> {
        self.transition("queue", TaskStatus::Queued)
    }

    /// Executes the task against its model.
    ///
    /// Errors coming from the model are captured in the task and reported by `success`
    /// and `failure`, they are never returned from here.
    ///
    /// # Returns
    /// Whether the task succeeded, or `InvalidState` if it was already run.
    pub fn run(&mut self) -> Result<bool> {
        self.transition("run", TaskStatus::Running)?;
        self.started_at = Some(Instant::now());

        match self.execute() {
            Ok(outputs) => {
                self.success = true;
                self.outputs = outputs;
            }
            Err(e) => {
                warn!(task_id = self.id, kind:% = self.kind; "{e}");
                self.success = false;
                self.outputs.clear();
                self.failure = Some(e);
            }
        }

        self.finished_at = Some(Instant::now());
        self.status = TaskStatus::Completed;

        debug!(
            task_id = self.id,
            model_id = self.model.id(),
            success = self.success;
            "task completed"
        );

        Ok(self.success)
    }

    /// Hands the result to whoever requested the task.
    ///
    /// # Returns
    /// The outcome, or `InvalidState` if the task hasn't completed or was already applied.
    pub fn apply(&mut self) -> Result<TaskOutcome> {
        self.transition("apply", TaskStatus::Applied)?;

        let outcome = TaskOutcome {
            task_id: self.id,
            kind: self.kind,
            success: self.success,
            outputs: self.outputs.clone(),
            failure: self.failure.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        };

        if let Some(callback) = self.callback.take() {
            callback(&outcome);
        }

        Ok(outcome)
    }

    fn with_payload(mut self, kind: TaskKind, payload: Payload) -> Result<Self> {
        if self.status != TaskStatus::Created {
            return Err(TaskErr::InvalidState {
                task: self.id,
                op: "set the inputs of",
                status: self.status,
            });
        }

        if self.kind != kind {
            return Err(TaskErr::InvalidArgument("the inputs don't match the task kind"));
        }

        self.payload = payload;
        Ok(self)
    }

    fn transition(&mut self, op: &'static str, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(&next) {
            return Err(TaskErr::InvalidState {
                task: self.id,
                op,
                status: self.status,
            });
        }

        self.status = next;
        Ok(())
    }

    fn execute(&self) -> std::result::Result<Vec<Vec<f32>>, TaskFailure> {
        match (self.kind, &self.payload) {
            (TaskKind::None, _) => Err(TaskFailure::NothingToDo),
            (TaskKind::Train, Payload::Examples(examples)) => {
                self.model.train(examples)?;
                Ok(Vec::new())
            }
            (TaskKind::Run, Payload::Inputs(inputs)) => {
                self.sample(std::slice::from_ref(inputs), false)
            }
            (TaskKind::Run, Payload::Series(series)) => self.sample(series, true),
            (kind, _) => Err(TaskFailure::MissingInputs(kind)),
        }
    }

    /// Samples the model once per feature vector, threading the context through every call.
    ///
    /// If any sample fails, the context is restored to what it was before the first one.
    ///
    /// # Arguments
    /// * `series` - The feature vectors to sample, in order.
    /// * `stateful` - Whether to thread a task-local model state through the series when the
    ///   task has no context.
    fn sample(
        &self,
        series: &[Vec<f32>],
        stateful: bool,
    ) -> std::result::Result<Vec<Vec<f32>>, TaskFailure> {
        let context = match &self.context {
            Some(weak) => Some(weak.upgrade().ok_or(TaskFailure::ContextDropped)?),
            None => None,
        };

        let model = self.model.lock();
        let mut state = context.as_ref().map(|context| context.lock());
        let snapshot = state.as_deref().cloned();
        let mut local = (state.is_none() && stateful).then(ModelState::default);
        let mut outputs = Vec::with_capacity(series.len());

        for inputs in series {
            let current = state.as_deref_mut().or(local.as_mut());
            match model.predict(inputs, current) {
                Ok(output) => outputs.push(output),
                Err(e) => {
                    if let (Some(state), Some(snapshot)) = (state.as_deref_mut(), snapshot) {
                        *state = snapshot;
                    }
                    return Err(e.into());
                }
            }
        }

        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use machine_learning::{ModelInstance, ModelType, PredictErr, TrainErr};

    use super::*;

    fn classifier() -> ModelHandle {
        ModelHandle::new(ModelInstance::new(ModelType::Classification))
    }

    fn trained_classifier() -> ModelHandle {
        let model = classifier();
        let mut task = Task::training(
            &model,
            vec![
                Example::new(vec![0.0, 0.0], vec![0.0]),
                Example::new(vec![1.0, 1.0], vec![1.0]),
            ],
        )
        .unwrap();
        assert!(task.run().unwrap());
        model
    }

    #[test]
    fn test_missing_model_is_rejected() {
        assert!(matches!(
            Task::new(None, TaskKind::Train),
            Err(TaskErr::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_payload_must_match_kind() {
        let model = classifier();

        assert!(matches!(
            Task::new(Some(model.clone()), TaskKind::Train)
                .unwrap()
                .with_inputs(vec![0.0]),
            Err(TaskErr::InvalidArgument(_))
        ));
        assert!(matches!(
            Task::new(Some(model), TaskKind::Run)
                .unwrap()
                .with_examples(Vec::new()),
            Err(TaskErr::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_series_is_rejected() {
        assert!(matches!(
            Task::series(&classifier(), Vec::new()),
            Err(TaskErr::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_training_set_keeps_model() {
        let model = trained_classifier();
        let mut task = Task::training(&model, Vec::new()).unwrap();

        assert!(!task.run().unwrap());
        assert!(task.outputs().is_empty());
        assert_eq!(
            task.failure(),
            Some(&TaskFailure::Train(TrainErr::EmptyExampleSet))
        );
        assert!(model.is_trained());
    }

    #[test]
    fn test_untrained_model_fails_to_sample() {
        let mut task = Task::sampling(&classifier(), vec![0.0, 0.0]).unwrap();

        assert!(!task.run().unwrap());
        assert!(task.outputs().is_empty());
        assert_eq!(
            task.failure(),
            Some(&TaskFailure::Predict(PredictErr::ModelNotTrained))
        );
    }

    #[test]
    fn test_series_yields_one_output_per_input() {
        let model = trained_classifier();
        let series = vec![vec![0.1, 0.0], vec![0.9, 1.0], vec![0.0, 0.2]];
        let mut task = Task::series(&model, series).unwrap();

        assert!(task.run().unwrap());
        assert_eq!(task.outputs(), &[vec![0.0], vec![1.0], vec![0.0]]);
        assert_eq!(task.flat_outputs(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_series_without_context_keeps_state_between_inputs() {
        let model = ModelHandle::new(ModelInstance::new(ModelType::DynamicTimewarp));
        let rising = [0.0, 1.0, 2.0, 3.0].map(|x| Example::new(vec![x], vec![1.0]));
        let falling = [3.0, 2.0, 1.0, 0.0].map(|x| Example::new(vec![x], vec![2.0]));
        let examples = rising.into_iter().chain(falling).collect();
        let mut train = Task::training(&model, examples).unwrap();
        assert!(train.run().unwrap());

        let series = vec![vec![3.0], vec![2.0], vec![1.0], vec![0.0]];

        let mut detached = Task::series(&model, series.clone()).unwrap();
        assert!(detached.run().unwrap());

        let context: SharedContext = Arc::default();
        let mut attached = Task::series(&model, series).unwrap().with_context(&context);
        assert!(attached.run().unwrap());

        assert_eq!(detached.outputs(), attached.outputs());
        assert_eq!(detached.outputs().last(), Some(&vec![2.0]));
    }

    #[test]
    fn test_failing_series_restores_context() {
        let model = trained_classifier();
        let context: SharedContext = Arc::default();
        context.lock().push(&[0.5, 0.5]);
        let before = context.lock().clone();

        let mut task = Task::series(&model, vec![vec![0.0, 0.0], vec![0.0]])
            .unwrap()
            .with_context(&context);

        assert!(!task.run().unwrap());
        assert!(task.outputs().is_empty());
        assert_eq!(*context.lock(), before);
    }

    #[test]
    fn test_dropped_context_fails_run() {
        let model = trained_classifier();
        let context: SharedContext = Arc::default();
        let mut task = Task::sampling(&model, vec![0.0, 0.0])
            .unwrap()
            .with_context(&context);
        drop(context);

        assert!(!task.run().unwrap());
        assert_eq!(task.failure(), Some(&TaskFailure::ContextDropped));
    }

    #[test]
    fn test_none_kind_does_nothing() {
        let mut task = Task::new(Some(classifier()), TaskKind::None).unwrap();

        assert!(!task.run().unwrap());
        assert_eq!(task.failure(), Some(&TaskFailure::NothingToDo));
    }

    #[test]
    fn test_apply_requires_completed_run() {
        let mut task = Task::sampling(&classifier(), vec![0.0]).unwrap();

        assert!(matches!(task.apply(), Err(TaskErr::InvalidState { .. })));
        task.run().unwrap();
        assert!(matches!(task.run(), Err(TaskErr::InvalidState { .. })));

        let outcome = task.apply().unwrap();
        assert!(!outcome.success);
        assert!(outcome.outputs.is_empty());
        assert!(task.status().is_terminal());
        assert!(matches!(task.apply(), Err(TaskErr::InvalidState { .. })));
    }

    #[test]
    fn test_callback_runs_once_on_apply() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut task = Task::sampling(&trained_classifier(), vec![1.0, 1.0])
            .unwrap()
            .on_applied(move |outcome| {
                assert_eq!(outcome.outputs, vec![vec![1.0]]);
                counter.fetch_add(1, Ordering::SeqCst);
            });

        task.run().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        task.apply().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_owner_is_never_touched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let owner = Arc::new(Arc::clone(&calls));
        let mut task = Task::sampling(&trained_classifier(), vec![1.0, 1.0])
            .unwrap()
            .on_applied_for(&owner, |owner, _| {
                owner.fetch_add(1, Ordering::SeqCst);
            });

        task.run().unwrap();
        drop(owner);
        task.apply().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_status_transitions() {
        assert!(TaskStatus::Created.can_transition_to(&TaskStatus::Queued));
        assert!(TaskStatus::Queued.can_transition_to(&TaskStatus::Running));
        assert!(!TaskStatus::Created.can_transition_to(&TaskStatus::Applied));
        assert!(!TaskStatus::Applied.can_transition_to(&TaskStatus::Running));
        assert!(!TaskStatus::Queued.can_transition_to(&TaskStatus::Queued));
    }
}

use std::{error::Error, fmt, io};

use machine_learning::{PredictErr, TrainErr};

use crate::task::{TaskKind, TaskStatus};

/// The tasks module's result type.
pub type Result<T> = std::result::Result<T, TaskErr>;

/// Misuse of a task or a dispatcher, reported to the caller that made it.
#[derive(Debug)]
pub enum TaskErr {
    /// The task was built with a missing or malformed argument.
    InvalidArgument(&'static str),
    /// The operation isn't valid for the task's current status.
    InvalidState {
        task: u64,
        op: &'static str,
        status: TaskStatus,
    },
    /// The model's backlog is full.
    Backpressure { model: u64, backlog: usize },
    Io(io::Error),
}

impl fmt::Display for TaskErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskErr::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            TaskErr::InvalidState { task, op, status } => {
                write!(f, "can't {op} task {task} while it is {status}")
            }
            TaskErr::Backpressure { model, backlog } => write!(
                f,
                "model {model} already has {backlog} tasks waiting to run"
            ),
            TaskErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for TaskErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TaskErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TaskErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<TaskErr> for io::Error {
    fn from(value: TaskErr) -> Self {
        match value {
            TaskErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }
}

/// Why a task finished with `success = false`.
///
/// Failures are captured on the worker and carried back to the owning thread as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFailure {
    Train(TrainErr),
    Predict(PredictErr),
    /// The payload the task kind needs was never set.
    MissingInputs(TaskKind),
    /// The model state was dropped before the task ran.
    ContextDropped,
    /// The task kind is `None`.
    NothingToDo,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Train(e) => write!(f, "training failed: {e}"),
            TaskFailure::Predict(e) => write!(f, "sampling failed: {e}"),
            TaskFailure::MissingInputs(kind) => write!(f, "{kind} task has no inputs"),
            TaskFailure::ContextDropped => f.write_str("the model state was dropped"),
            TaskFailure::NothingToDo => f.write_str("the task has nothing to do"),
        }
    }
}

impl Error for TaskFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TaskFailure::Train(e) => Some(e),
            TaskFailure::Predict(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TrainErr> for TaskFailure {
    fn from(value: TrainErr) -> Self {
        Self::Train(value)
    }
}

impl From<PredictErr> for TaskFailure {
    fn from(value: PredictErr) -> Self {
        Self::Predict(value)
    }
}

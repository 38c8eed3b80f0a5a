pub mod access;
pub mod config;
pub mod dispatch;
pub mod error;
mod handle;
mod task;

pub use access::{AccessErr, ModelAccess, ModelRegistry, OwnerId};
pub use config::{Config, ConfigErr};
pub use dispatch::{Dispatcher, ImmediateDispatcher, TaskTicket, WorkerPool};
pub use error::{Result, TaskErr, TaskFailure};
pub use handle::ModelHandle;
pub use task::{SharedContext, Task, TaskKind, TaskOutcome, TaskStatus};

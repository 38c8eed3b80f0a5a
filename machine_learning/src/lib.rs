pub mod arch;
pub mod dataset;
pub mod error;
pub mod models;
pub mod optimization;
pub mod state;

pub use arch::{Model, ModelType, UnknownModelType};
pub use dataset::Example;
pub use error::{PredictErr, PredictResult, TrainErr, TrainResult};
pub use models::ModelInstance;
pub use state::ModelState;

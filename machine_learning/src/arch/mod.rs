pub mod activations;
mod error;
mod kind;
pub mod layers;
pub mod loss;
mod model;
mod sequential;

pub use error::SizeMismatchErr;
pub use kind::{ModelType, UnknownModelType};
pub use model::Model;
pub use sequential::Sequential;

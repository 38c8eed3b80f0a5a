mod dtw;
mod instance;
mod knn;
mod mlp;

pub use dtw::{Dtw, Template};
pub use instance::ModelInstance;
pub use knn::Knn;
pub use mlp::{Mlp, MlpConfig};

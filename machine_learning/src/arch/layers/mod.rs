mod dense;

pub use dense::{Dense, Pass};

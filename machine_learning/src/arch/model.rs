use super::ModelType;
use crate::{
    dataset::Example,
    error::{PredictResult, TrainResult},
    state::ModelState,
};

/// A trainable mapping from feature vectors to outputs.
pub trait Model {
    /// The family this model belongs to.
    fn model_type(&self) -> ModelType;

    /// Whether the model holds trained parameters and can be sampled.
    fn is_trained(&self) -> bool;

    /// The width of the feature vectors the model was trained with, if trained.
    fn input_width(&self) -> Option<usize>;

    /// Replaces the model's parameters with ones fitted to `examples`.
    ///
    /// Training either commits completely or leaves the model untouched.
    ///
    /// # Arguments
    /// * `examples` - The labeled training set.
    fn train(&mut self, examples: &[Example]) -> TrainResult<()>;

    /// Computes the output for a single feature vector.
    ///
    /// # Arguments
    /// * `inputs` - The feature vector, as wide as the training inputs.
    /// * `state` - The session context, carried across consecutive calls of a stream.
    fn predict(&self, inputs: &[f32], state: Option<&mut ModelState>) -> PredictResult<Vec<f32>>;

    /// Drops any trained parameters.
    fn reset(&mut self);
}

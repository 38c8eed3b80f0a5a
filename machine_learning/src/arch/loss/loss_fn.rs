use ndarray::{Array2, ArrayView2};

/// A differentiable measure of how far a batch of predictions is from its targets.
pub trait LossFn {
    /// The mean loss over the batch.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    /// The derivative of `loss` with respect to every prediction in the batch.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}

use ndarray::{Array2, ArrayView2, Zip};

use super::LossFn;

/// Mean squared error, averaged over every element of the batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

impl LossFn for Mse {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let n = y_pred.len().max(1) as f32;
        Zip::from(&y_pred)
            .and(&y)
            .fold(0.0f32, |acc, p, t| acc + (p - t).powi(2))
            / n
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let scale = 2.0 / y_pred.len().max(1) as f32;
        Zip::from(&y_pred)
            .and(&y)
            .map_collect(|p, t| (p - t) * scale)
    }
}

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{
    SizeMismatchErr,
    layers::{Dense, Pass},
    loss::LossFn,
};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// The parameters live outside the model in a single flat buffer, each layer owning the
/// contiguous slice that follows the previous layer's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequential {
    layers: Vec<Dense>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Dense>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.layers.iter().map(Dense::size).sum()
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The input batch, one sample per row.
    ///
    /// # Returns
    /// The prediction for every row, or an error if `params` doesn't fit the layers.
    pub fn forward(
        &self,
        params: &[f32],
        x: ArrayView2<f32>,
    ) -> Result<Array2<f32>, SizeMismatchErr> {
        self.check(params.len())?;

        let mut a = x.to_owned();
        for (layer, params) in self.layers.iter().zip(self.split(params)) {
            a = layer.forward(params, a.view())?.a;
        }

        Ok(a)
    }

    /// Computes the gradient of the loss over one batch.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - A buffer the size of `params` where the gradient is written.
    /// * `loss_fn` - The loss function.
    /// * `x` - The input batch.
    /// * `y` - The expected outputs of the batch.
    ///
    /// # Returns
    /// The batch loss.
    pub fn backprop<L: LossFn>(
        &self,
        params: &[f32],
        grad: &mut [f32],
        loss_fn: &L,
        x: ArrayView2<f32>,
        y: ArrayView2<f32>,
    ) -> Result<f32, SizeMismatchErr> {
        self.check(params.len())?;
        self.check(grad.len())?;

        let layer_params: Vec<&[f32]> = self.split(params).collect();
        let mut inputs: Vec<Array2<f32>> = Vec::with_capacity(self.layers.len());
        let mut passes: Vec<Pass> = Vec::with_capacity(self.layers.len());

        let mut a = x.to_owned();
        for (layer, params) in self.layers.iter().zip(&layer_params) {
            let pass = layer.forward(params, a.view())?;
            inputs.push(a);
            a = pass.a.clone();
            passes.push(pass);
        }

        let loss = loss_fn.loss(a.view(), y);
        let mut d = loss_fn.loss_prime(a.view(), y);

        let mut grads = self.split_mut(grad);
        for i in (0..self.layers.len()).rev() {
            let grad = grads.pop().ok_or(SizeMismatchErr::new(i, self.layers.len()))?;
            d = self.layers[i].backward(layer_params[i], grad, inputs[i].view(), &passes[i], d)?;
        }

        Ok(loss)
    }

    fn check(&self, len: usize) -> Result<(), SizeMismatchErr> {
        let size = self.size();
        if len != size {
            return Err(SizeMismatchErr::new(len, size));
        }
        Ok(())
    }

    fn split<'a>(&'a self, mut buf: &'a [f32]) -> impl Iterator<Item = &'a [f32]> + 'a {
        self.layers.iter().map(move |layer| {
            let (head, tail) = buf.split_at(layer.size());
            buf = tail;
            head
        })
    }

    fn split_mut<'a>(&self, mut buf: &'a mut [f32]) -> Vec<&'a mut [f32]> {
        let mut slices = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (head, tail) = std::mem::take(&mut buf).split_at_mut(layer.size());
            slices.push(head);
            buf = tail;
        }
        slices
    }
}

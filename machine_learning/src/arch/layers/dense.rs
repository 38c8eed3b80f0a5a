use ndarray::{linalg, prelude::*};
use serde::{Deserialize, Serialize};

use crate::arch::{SizeMismatchErr, activations::ActFn};

/// What a `Dense` layer remembers of a forward pass for its backward pass.
#[derive(Debug, Clone)]
pub struct Pass {
    pub z: Array2<f32>,
    pub a: Array2<f32>,
}

/// A fully connected layer reading its weights and biases from a flat parameter slice.
///
/// The slice is laid out as `dim.0 * dim.1` row-major weights followed by `dim.1` biases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
}

impl Dense {
    /// Creates a new `Dense`.
    ///
    /// # Arguments
    /// * `dim` - The (input, output) width of the layer.
    /// * `act_fn` - The activation applied to the output, `None` for a linear layer.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self { dim, act_fn }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        (self.dim.0 + 1) * self.dim.1
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Computes the layer's output for a batch of rows.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `x` - The input batch, one sample per row.
    pub fn forward(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Pass, SizeMismatchErr> {
        let (w, b) = self.view_params(params)?;

        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        let a = match &self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        };

        Ok(Pass { z, a })
    }

    /// Writes this layer's gradient and returns the delta for the previous layer.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `grad` - This layer's slice of the gradient buffer.
    /// * `x` - The input this layer saw on the forward pass.
    /// * `pass` - What the forward pass produced.
    /// * `d` - The derivative of the loss with respect to this layer's output.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        x: ArrayView2<f32>,
        pass: &Pass,
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>, SizeMismatchErr> {
        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&pass.z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>), SizeMismatchErr> {
        let mismatch = SizeMismatchErr::new(grad.len(), self.size());
        if grad.len() != self.size() {
            return Err(mismatch);
        }

        let (dw_raw, db_raw) = grad.split_at_mut(self.size() - self.dim.1);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).map_err(|_| mismatch)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).map_err(|_| mismatch)?;
        Ok((dw, db))
    }

    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>), SizeMismatchErr> {
        let mismatch = SizeMismatchErr::new(params.len(), self.size());
        if params.len() != self.size() {
            return Err(mismatch);
        }

        let (w_raw, b_raw) = params.split_at(self.size() - self.dim.1);
        let w = ArrayView2::from_shape(self.dim, w_raw).map_err(|_| mismatch)?;
        let b = ArrayView1::from_shape(self.dim.1, b_raw).map_err(|_| mismatch)?;
        Ok((w, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_forward() {
        // w = [[1, 2], [3, 4]], b = [10, 20]
        let layer = Dense::new((2, 2), None);
        let params: [f32; 6] = [1.0, 2.0, 3.0, 4.0, 10.0, 20.0];
        let x = array![[1.0, 1.0]];

        let pass = layer.forward(&params, x.view()).unwrap();
        assert_eq!(pass.a, array![[14.0, 26.0]]);
    }

    #[test]
    fn test_backward_writes_gradient() {
        let layer = Dense::new((1, 1), None);
        let params: [f32; 2] = [2.0, 0.0];
        let mut grad = [0.0f32; 2];
        let x = array![[3.0]];

        let pass = layer.forward(&params, x.view()).unwrap();
        let d_prev = layer
            .backward(&params, &mut grad, x.view(), &pass, array![[1.0]])
            .unwrap();

        assert_eq!(grad, [3.0, 1.0]);
        assert_eq!(d_prev, array![[2.0]]);
    }

    #[test]
    fn test_wrong_param_count_is_rejected() {
        let layer = Dense::new((2, 2), None);
        let x = array![[1.0, 1.0]];

        assert!(layer.forward(&[0.0f32; 3], x.view()).is_err());
    }
}

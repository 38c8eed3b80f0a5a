use super::Optimizer;

/// Gradient descent with classical momentum.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f32,
    momentum: f32,
    velocity: Vec<f32>,
}

impl GradientDescent {
    /// Returns a new `GradientDescent`.
    ///
    /// # Arguments
    /// * `learning_rate` - The *length* of the steps taken on `update_params`.
    /// * `momentum` - The fraction of the previous step carried into the next one, `0` for plain descent.
    pub fn new(learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: Vec::new(),
        }
    }
}

impl Optimizer for GradientDescent {
    /// Makes a step in the opposite direction of the gradient, with a length of `learning_rate`,
    /// plus `momentum` times the previous step.
    ///
    /// # Arguments
    /// * `params` - The parameters that are going to be modified.
    /// * `grad` - The gradient used for taking the step.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) {
        if self.velocity.len() != params.len() {
            self.velocity = vec![0.0; params.len()];
        }

        let (lr, mu) = (self.learning_rate, self.momentum);

        for ((w, v), g) in params.iter_mut().zip(&mut self.velocity).zip(grad) {
            *v = mu * *v - lr * g;
            *w += *v;
        }
    }
}

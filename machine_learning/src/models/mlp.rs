use std::num::NonZeroUsize;

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::{
    arch::{
        Model, ModelType, Sequential,
        activations::ActFn,
        layers::Dense,
        loss::Mse,
    },
    dataset::{Dataset, Example},
    error::{self, PredictErr, PredictResult, TrainResult},
    optimization::{GradientDescent, Optimizer},
    state::ModelState,
};

/// Hyperparameters of a `Mlp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpConfig {
    pub hidden_layers: usize,
    /// Width of every hidden layer, the input width if `None`.
    pub hidden_nodes: Option<NonZeroUsize>,
    pub epochs: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    pub learning_rate: f32,
    pub momentum: f32,
    pub seed: u64,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_layers: 1,
            hidden_nodes: None,
            epochs: NonZeroUsize::new(500).unwrap_or(NonZeroUsize::MIN),
            batch_size: NonZeroUsize::MIN,
            learning_rate: 0.3,
            momentum: 0.2,
            seed: 0x1a7e_2ac7,
        }
    }
}

/// Per column affine map onto `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Scaler {
    min: Vec<f32>,
    span: Vec<f32>,
}

impl Scaler {
    fn fit(data: &Array2<f32>) -> Self {
        let min = data.fold_axis(Axis(0), f32::INFINITY, |acc, v| acc.min(*v));
        let max = data.fold_axis(Axis(0), f32::NEG_INFINITY, |acc, v| acc.max(*v));
        let span = (&max - &min).mapv(|s| if s > f32::EPSILON { s } else { 1.0 });

        Self {
            min: min.to_vec(),
            span: span.to_vec(),
        }
    }

    fn scale(&self, data: &Array2<f32>) -> Array2<f32> {
        (data - &ArrayView1::from(&self.min[..])) / &ArrayView1::from(&self.span[..])
    }

    fn scale_row(&self, row: &[f32]) -> Array1<f32> {
        row.iter()
            .zip(self.min.iter().zip(&self.span))
            .map(|(v, (min, span))| (v - min) / span)
            .collect()
    }

    fn unscale_row(&self, row: ArrayView1<f32>) -> Vec<f32> {
        row.iter()
            .zip(self.min.iter().zip(&self.span))
            .map(|(v, (min, span))| v * span + min)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Fitted {
    net: Sequential,
    params: Vec<f32>,
    x_scaler: Scaler,
    y_scaler: Scaler,
    loss: f32,
}

impl Fitted {
    /// Checks that the scalers agree with the outer widths of the network.
    fn check_widths(&self) -> PredictResult<()> {
        let layers = self.net.layers();
        let (Some(first), Some(last)) = (layers.first(), layers.last()) else {
            return Err(PredictErr::ParamsMismatch {
                got: 0,
                expected: self.x_scaler.min.len(),
            });
        };

        let widths = [
            (self.x_scaler.min.len(), first.dim().0),
            (self.x_scaler.span.len(), first.dim().0),
            (self.y_scaler.min.len(), last.dim().1),
            (self.y_scaler.span.len(), last.dim().1),
        ];

        match widths.into_iter().find(|(got, expected)| got != expected) {
            Some((got, expected)) => Err(PredictErr::ParamsMismatch { got, expected }),
            None => Ok(()),
        }
    }
}

/// A multilayer perceptron regressor.
///
/// Hidden layers use a sigmoid activation and the output layer is linear. Inputs and targets
/// are normalised with the ranges seen in the training set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mlp {
    config: MlpConfig,
    fitted: Option<Fitted>,
}

impl Mlp {
    /// Creates a new, untrained `Mlp`.
    pub fn new(config: MlpConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    /// The mean loss of the last training epoch, if trained.
    pub fn loss(&self) -> Option<f32> {
        self.fitted.as_ref().map(|fitted| fitted.loss)
    }

    fn build(&self, x_size: usize, y_size: usize) -> Sequential {
        let hidden = self.config.hidden_nodes.map_or(x_size, NonZeroUsize::get);
        let mut width = x_size;
        let mut layers = Vec::with_capacity(self.config.hidden_layers + 1);

        for _ in 0..self.config.hidden_layers {
            layers.push(Dense::new((width, hidden), Some(ActFn::sigmoid(1.0))));
            width = hidden;
        }

        layers.push(Dense::new((width, y_size), None));
        Sequential::new(layers)
    }

    fn fit(&self, dataset: &Dataset) -> TrainResult<Fitted> {
        let config = &self.config;
        let net = self.build(dataset.x_size(), dataset.y_size());
        let mut rng = StdRng::seed_from_u64(config.seed);

        let x_scaler = Scaler::fit(dataset.x());
        let y_scaler = Scaler::fit(dataset.y());
        let x = x_scaler.scale(dataset.x());
        let y = y_scaler.scale(dataset.y());

        let mut params = init_params(&net, &mut rng);
        let mut grad = vec![0.0; params.len()];
        let mut optimizer = GradientDescent::new(config.learning_rate, config.momentum);
        let mut order: Vec<usize> = (0..dataset.len()).collect();
        let mut loss = 0.0;

        for _ in 0..config.epochs.get() {
            order.shuffle(&mut rng);

            let mut total_loss = 0.0;
            let mut num_batches = 0usize;

            for batch in order.chunks(config.batch_size.get()) {
                let bx = x.select(Axis(0), batch);
                let by = y.select(Axis(0), batch);

                total_loss += net.backprop(&params, &mut grad, &Mse, bx.view(), by.view())?;
                num_batches += 1;
                optimizer.update_params(&mut params, &grad);
            }

            loss = total_loss / num_batches.max(1) as f32;
        }

        debug!(
            epochs = config.epochs.get(),
            examples = dataset.len(),
            loss = loss;
            "regression model fitted"
        );

        Ok(Fitted {
            net,
            params,
            x_scaler,
            y_scaler,
            loss,
        })
    }
}

impl Model for Mlp {
    fn model_type(&self) -> ModelType {
        ModelType::Regression
    }

    fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    fn input_width(&self) -> Option<usize> {
        self.fitted.as_ref().map(|fitted| fitted.x_scaler.min.len())
    }

    fn train(&mut self, examples: &[Example]) -> TrainResult<()> {
        let dataset = Dataset::new(examples)?;
        let fitted = self.fit(&dataset)?;

        self.fitted = Some(fitted);
        Ok(())
    }

    fn predict(&self, inputs: &[f32], state: Option<&mut ModelState>) -> PredictResult<Vec<f32>> {
        error::check_inputs(self.input_width(), inputs)?;
        let Some(fitted) = &self.fitted else {
            return Err(PredictErr::ModelNotTrained);
        };
        fitted.check_widths()?;

        let x = fitted.x_scaler.scale_row(inputs).insert_axis(Axis(0));
        let y = fitted.net.forward(&fitted.params, x.view())?;
        let outputs = fitted.y_scaler.unscale_row(y.row(0));

        Ok(match state {
            Some(state) => state.observe(inputs, outputs),
            None => outputs,
        })
    }

    fn reset(&mut self) {
        self.fitted = None;
    }
}

/// Xavier-uniform weights and zero biases for every layer.
fn init_params<R: Rng>(net: &Sequential, rng: &mut R) -> Vec<f32> {
    let mut params = Vec::with_capacity(net.size());

    for layer in net.layers() {
        let (n, m) = layer.dim();
        let limit = (6.0 / (n + m).max(1) as f32).sqrt();

        params.extend((0..n * m).map(|_| rng.random_range(-limit..limit)));
        params.extend(std::iter::repeat_n(0.0, m));
    }

    params
}

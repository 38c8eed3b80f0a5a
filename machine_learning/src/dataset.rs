use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{TrainErr, TrainResult};

/// A labeled training example: a feature vector and the target it should map to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub inputs: Vec<f32>,
    pub outputs: Vec<f32>,
}

impl Example {
    /// Creates a new `Example`.
    ///
    /// # Arguments
    /// * `inputs` - The feature vector.
    /// * `outputs` - The target values.
    pub fn new(inputs: Vec<f32>, outputs: Vec<f32>) -> Self {
        Self { inputs, outputs }
    }
}

/// A validated, dense view of a training set.
///
/// Rows of `x` and `y` correspond to the examples in the order they were given.
#[derive(Debug, Clone)]
pub struct Dataset {
    x: Array2<f32>,
    y: Array2<f32>,
}

impl Dataset {
    /// Validates `examples` and packs them into two matrices.
    ///
    /// # Arguments
    /// * `examples` - The training examples, all with the same input and target widths.
    ///
    /// # Returns
    /// The packed dataset or the first inconsistency found.
    pub fn new(examples: &[Example]) -> TrainResult<Self> {
        let (x_size, y_size) = widths(examples)?;
        let len = examples.len();

        let mut x = Vec::with_capacity(len * x_size);
        let mut y = Vec::with_capacity(len * y_size);

        for example in examples {
            x.extend_from_slice(&example.inputs);
            y.extend_from_slice(&example.outputs);
        }

        // Shapes are consistent with the buffers after `widths`.
        let x = Array2::from_shape_vec((len, x_size), x).map_err(|_| TrainErr::NoFeatures)?;
        let y = Array2::from_shape_vec((len, y_size), y).map_err(|_| TrainErr::NoFeatures)?;

        Ok(Self { x, y })
    }

    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn x_size(&self) -> usize {
        self.x.ncols()
    }

    pub fn y_size(&self) -> usize {
        self.y.ncols()
    }

    pub fn x(&self) -> &Array2<f32> {
        &self.x
    }

    pub fn y(&self) -> &Array2<f32> {
        &self.y
    }
}

/// Returns the common input and target widths of a training set.
///
/// # Arguments
/// * `examples` - The training examples.
///
/// # Returns
/// A tuple of (input width, target width) or the first inconsistency found.
pub fn widths(examples: &[Example]) -> TrainResult<(usize, usize)> {
    let first = examples.first().ok_or(TrainErr::EmptyExampleSet)?;
    let x_size = first.inputs.len();
    let y_size = first.outputs.len();

    if x_size == 0 {
        return Err(TrainErr::NoFeatures);
    }

    if y_size == 0 {
        return Err(TrainErr::NoTargets);
    }

    for (i, example) in examples.iter().enumerate() {
        if example.inputs.len() != x_size {
            return Err(TrainErr::FeatureWidthMismatch {
                example: i,
                got: example.inputs.len(),
                expected: x_size,
            });
        }

        if example.outputs.len() != y_size {
            return Err(TrainErr::TargetWidthMismatch {
                example: i,
                got: example.outputs.len(),
                expected: y_size,
            });
        }
    }

    Ok((x_size, y_size))
}

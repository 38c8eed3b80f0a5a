use std::{
    error::Error,
    fmt::{self, Display},
};

use crate::arch::SizeMismatchErr;

/// The result type used when training a model.
pub type TrainResult<T> = std::result::Result<T, TrainErr>;

/// The result type used when sampling a model.
pub type PredictResult<T> = std::result::Result<T, PredictErr>;

/// Reasons a training set is rejected by a model.
///
/// A model that returns any of these is left exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainErr {
    EmptyExampleSet,
    NoFeatures,
    NoTargets,
    FeatureWidthMismatch {
        example: usize,
        got: usize,
        expected: usize,
    },
    TargetWidthMismatch {
        example: usize,
        got: usize,
        expected: usize,
    },
    ParamsMismatch {
        got: usize,
        expected: usize,
    },
}

impl Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::EmptyExampleSet => f.write_str("the training set has no examples"),
            TrainErr::NoFeatures => f.write_str("the training examples have no input features"),
            TrainErr::NoTargets => f.write_str("the training examples have no target values"),
            TrainErr::FeatureWidthMismatch {
                example,
                got,
                expected,
            } => write!(
                f,
                "example {example} has {got} input features, expected {expected}"
            ),
            TrainErr::TargetWidthMismatch {
                example,
                got,
                expected,
            } => write!(
                f,
                "example {example} has {got} target values, expected {expected}"
            ),
            TrainErr::ParamsMismatch { got, expected } => write!(
                f,
                "the model holds {got} parameters but its layers need {expected}"
            ),
        }
    }
}

impl Error for TrainErr {}

impl From<SizeMismatchErr> for TrainErr {
    fn from(value: SizeMismatchErr) -> Self {
        Self::ParamsMismatch {
            got: value.got,
            expected: value.expected,
        }
    }
}

/// Reasons a model refuses to produce an output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictErr {
    ModelNotTrained,
    FeatureWidthMismatch { got: usize, expected: usize },
    ParamsMismatch { got: usize, expected: usize },
}

impl Display for PredictErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictErr::ModelNotTrained => f.write_str("the model has not been trained"),
            PredictErr::FeatureWidthMismatch { got, expected } => write!(
                f,
                "got {got} input features but the model was trained with {expected}"
            ),
            PredictErr::ParamsMismatch { got, expected } => write!(
                f,
                "the model holds {got} parameters but its layers need {expected}"
            ),
        }
    }
}

impl Error for PredictErr {}

impl From<SizeMismatchErr> for PredictErr {
    fn from(value: SizeMismatchErr) -> Self {
        Self::ParamsMismatch {
            got: value.got,
            expected: value.expected,
        }
    }
}

/// Checks a feature vector against the width a model was trained with.
///
/// # Arguments
/// * `expected` - The trained input width, `None` if the model is untrained.
/// * `inputs` - The feature vector to check.
///
/// # Returns
/// The input width or the reason the vector can't be sampled.
pub(crate) fn check_inputs(expected: Option<usize>, inputs: &[f32]) -> PredictResult<usize> {
    let expected = expected.ok_or(PredictErr::ModelNotTrained)?;

    if inputs.len() != expected {
        return Err(PredictErr::FeatureWidthMismatch {
            got: inputs.len(),
            expected,
        });
    }

    Ok(expected)
}

use serde::{Deserialize, Serialize};

use super::{Dtw, Knn, Mlp};
use crate::{
    arch::{Model, ModelType},
    dataset::Example,
    error::{PredictResult, TrainResult},
    state::ModelState,
};

/// Any of the concrete models, dispatched by variant.
///
/// This is also the persisted form of a model: the `type` field of the JSON object names the
/// variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelInstance {
    Classification(Knn),
    Regression(Mlp),
    DynamicTimewarp(Dtw),
}

impl ModelInstance {
    /// Creates a new untrained model of the given type with its default settings.
    pub fn new(model_type: ModelType) -> Self {
        match model_type {
            ModelType::Classification => Self::Classification(Knn::default()),
            ModelType::Regression => Self::Regression(Mlp::default()),
            ModelType::DynamicTimewarp => Self::DynamicTimewarp(Dtw::default()),
        }
    }
}

impl Model for ModelInstance {
    fn model_type(&self) -> ModelType {
        match self {
            Self::Classification(_) => ModelType::Classification,
            Self::Regression(_) => ModelType::Regression,
            Self::DynamicTimewarp(_) => ModelType::DynamicTimewarp,
        }
    }

    fn is_trained(&self) -> bool {
        match self {
            Self::Classification(m) => m.is_trained(),
            Self::Regression(m) => m.is_trained(),
            Self::DynamicTimewarp(m) => m.is_trained(),
        }
    }

    fn input_width(&self) -> Option<usize> {
        match self {
            Self::Classification(m) => m.input_width(),
            Self::Regression(m) => m.input_width(),
            Self::DynamicTimewarp(m) => m.input_width(),
        }
    }

    fn train(&mut self, examples: &[Example]) -> TrainResult<()> {
        match self {
            Self::Classification(m) => m.train(examples),
            Self::Regression(m) => m.train(examples),
            Self::DynamicTimewarp(m) => m.train(examples),
        }
    }

    fn predict(&self, inputs: &[f32], state: Option<&mut ModelState>) -> PredictResult<Vec<f32>> {
        match self {
            Self::Classification(m) => m.predict(inputs, state),
            Self::Regression(m) => m.predict(inputs, state),
            Self::DynamicTimewarp(m) => m.predict(inputs, state),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Classification(m) => m.reset(),
            Self::Regression(m) => m.reset(),
            Self::DynamicTimewarp(m) => m.reset(),
        }
    }
}

impl From<Knn> for ModelInstance {
    fn from(value: Knn) -> Self {
        Self::Classification(value)
    }
}

impl From<Mlp> for ModelInstance {
    fn from(value: Mlp) -> Self {
        Self::Regression(value)
    }
}

impl From<Dtw> for ModelInstance {
    fn from(value: Dtw) -> Self {
        Self::DynamicTimewarp(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_matches_requested_type() {
        for model_type in [
            ModelType::Classification,
            ModelType::Regression,
            ModelType::DynamicTimewarp,
        ] {
            let model = ModelInstance::new(model_type);
            assert_eq!(model.model_type(), model_type);
            assert!(!model.is_trained());
        }
    }

    #[test]
    fn test_trained_model_survives_json() {
        let mut model = ModelInstance::new(ModelType::Classification);
        model
            .train(&[
                Example::new(vec![0.0], vec![0.0]),
                Example::new(vec![1.0], vec![1.0]),
            ])
            .unwrap();

        let json = serde_json::to_string(&model).unwrap();
        assert!(json.contains("\"type\":\"classification\""));

        let restored: ModelInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, model);
        assert_eq!(restored.predict(&[0.9], None), Ok(vec![1.0]));
    }

    #[test]
    fn test_reset_forgets_training() {
        let mut model = ModelInstance::new(ModelType::DynamicTimewarp);
        model.train(&[Example::new(vec![0.0], vec![1.0])]).unwrap();
        assert!(model.is_trained());

        model.reset();
        assert!(!model.is_trained());
        assert_eq!(model.input_width(), None);
    }
}

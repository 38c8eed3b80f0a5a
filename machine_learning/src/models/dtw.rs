use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    arch::{Model, ModelType},
    dataset::{self, Example},
    error::{self, PredictResult, TrainResult},
    state::ModelState,
};

/// A recorded series of feature vectors and the label it stands for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub label: Vec<f32>,
    pub frames: Vec<Vec<f32>>,
}

/// A series classifier based on dynamic time warping.
///
/// Consecutive training examples sharing a target are recorded as one template. When
/// sampling, the feature vectors kept in the session's `ModelState` window form the live
/// series, and the label of the closest template is returned.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dtw {
    templates: Vec<Template>,
    input_width: Option<usize>,
}

impl Dtw {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    fn nearest(&self, series: &[&[f32]]) -> Vec<f32> {
        self.templates
            .par_iter()
            .enumerate()
            .map(|(i, template)| (distance(series, &template.frames), i))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, i)| self.templates[i].label.clone())
            .unwrap_or_default()
    }
}

impl Model for Dtw {
    fn model_type(&self) -> ModelType {
        ModelType::DynamicTimewarp
    }

    fn is_trained(&self) -> bool {
        self.input_width.is_some()
    }

    fn input_width(&self) -> Option<usize> {
        self.input_width
    }

    fn train(&mut self, examples: &[Example]) -> TrainResult<()> {
        let (x_size, _) = dataset::widths(examples)?;

        let mut templates: Vec<Template> = Vec::new();
        for example in examples {
            match templates.last_mut() {
                Some(last) if last.label == example.outputs => {
                    last.frames.push(example.inputs.clone())
                }
                _ => templates.push(Template {
                    label: example.outputs.clone(),
                    frames: vec![example.inputs.clone()],
                }),
            }
        }

        self.templates = templates;
        self.input_width = Some(x_size);
        Ok(())
    }

    fn predict(&self, inputs: &[f32], state: Option<&mut ModelState>) -> PredictResult<Vec<f32>> {
        error::check_inputs(self.input_width, inputs)?;

        Ok(match state {
            Some(state) => {
                state.push(inputs);
                let series: Vec<&[f32]> = state.history().collect();
                self.nearest(&series)
            }
            None => self.nearest(&[inputs]),
        })
    }

    fn reset(&mut self) {
        self.templates.clear();
        self.input_width = None;
    }
}

/// Dynamic time warping cost between two series, normalised by their combined length.
fn distance<A, B>(a: &[A], b: &[B]) -> f32
where
    A: AsRef<[f32]>,
    B: AsRef<[f32]>,
{
    if a.is_empty() || b.is_empty() {
        return f32::INFINITY;
    }

    let mut prev = vec![f32::INFINITY; b.len() + 1];
    let mut curr = vec![f32::INFINITY; b.len() + 1];
    prev[0] = 0.0;

    for x in a {
        curr[0] = f32::INFINITY;
        for (j, y) in b.iter().enumerate() {
            let cost = frame_distance(x.as_ref(), y.as_ref());
            curr[j + 1] = cost + prev[j].min(prev[j + 1]).min(curr[j]);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()] / (a.len() + b.len()) as f32
}

fn frame_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f32>()
        .sqrt()
}

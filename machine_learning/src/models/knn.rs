use std::num::NonZeroUsize;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    arch::{Model, ModelType},
    dataset::{self, Example},
    error::{self, PredictResult, TrainResult},
    state::ModelState,
};

/// A k-nearest-neighbour classifier.
///
/// Training stores the examples; sampling returns the target shared by most of the `k`
/// examples closest to the input, the closest one winning ties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knn {
    k: NonZeroUsize,
    examples: Vec<Example>,
    input_width: Option<usize>,
}

impl Default for Knn {
    fn default() -> Self {
        Self::new(NonZeroUsize::MIN)
    }
}

impl Knn {
    /// Creates a new, untrained `Knn`.
    ///
    /// # Arguments
    /// * `k` - The amount of neighbours that vote on each sample.
    pub fn new(k: NonZeroUsize) -> Self {
        Self {
            k,
            examples: Vec::new(),
            input_width: None,
        }
    }

    pub fn k(&self) -> usize {
        self.k.get()
    }

    fn classify(&self, inputs: &[f32]) -> Vec<f32> {
        let mut nearest: Vec<(f32, usize)> = self
            .examples
            .par_iter()
            .enumerate()
            .map(|(i, example)| (sq_distance(&example.inputs, inputs), i))
            .collect();

        nearest.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        nearest.truncate(self.k.get());

        // (representative example, votes), in order of first appearance
        let mut votes: Vec<(usize, usize)> = Vec::new();
        for &(_, i) in &nearest {
            let outputs = &self.examples[i].outputs;
            match votes
                .iter_mut()
                .find(|(rep, _)| self.examples[*rep].outputs == *outputs)
            {
                Some((_, count)) => *count += 1,
                None => votes.push((i, 1)),
            }
        }

        // Strictly greater keeps the earliest, hence closest, representative on ties.
        let winner = votes
            .into_iter()
            .reduce(|best, vote| if vote.1 > best.1 { vote } else { best })
            .map_or(0, |(rep, _)| rep);

        self.examples
            .get(winner)
            .map(|example| example.outputs.clone())
            .unwrap_or_default()
    }
}

impl Model for Knn {
    fn model_type(&self) -> ModelType {
        ModelType::Classification
    }

    fn is_trained(&self) -> bool {
        self.input_width.is_some()
    }

    fn input_width(&self) -> Option<usize> {
        self.input_width
    }

    fn train(&mut self, examples: &[Example]) -> TrainResult<()> {
        let (x_size, _) = dataset::widths(examples)?;

        self.examples = examples.to_vec();
        self.input_width = Some(x_size);
        Ok(())
    }

    fn predict(&self, inputs: &[f32], state: Option<&mut ModelState>) -> PredictResult<Vec<f32>> {
        error::check_inputs(self.input_width, inputs)?;

        let outputs = self.classify(inputs);
        Ok(match state {
            Some(state) => state.observe(inputs, outputs),
            None => outputs,
        })
    }

    fn reset(&mut self) {
        self.examples.clear();
        self.input_width = None;
    }
}

fn sq_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(a, b)| (a - b).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PredictErr, TrainErr};

    fn examples() -> Vec<Example> {
        vec![
            Example::new(vec![0.0, 0.0], vec![1.0]),
            Example::new(vec![0.1, 0.0], vec![1.0]),
            Example::new(vec![1.0, 1.0], vec![2.0]),
            Example::new(vec![0.9, 1.0], vec![2.0]),
            Example::new(vec![0.45, 0.45], vec![2.0]),
        ]
    }

    #[test]
    fn test_nearest_neighbour() {
        let mut knn = Knn::default();
        knn.train(&examples()).unwrap();

        assert_eq!(knn.predict(&[0.05, 0.0], None), Ok(vec![1.0]));
        assert_eq!(knn.predict(&[1.0, 0.9], None), Ok(vec![2.0]));
    }

    #[test]
    fn test_majority_vote() {
        let mut knn = Knn::new(NonZeroUsize::new(3).unwrap());
        knn.train(&examples()).unwrap();

        // The single closest example is labeled 2 but two of the three closest are labeled 1.
        assert_eq!(knn.predict(&[0.3, 0.3], None), Ok(vec![1.0]));
    }

    #[test]
    fn test_untrained_refuses_to_sample() {
        let knn = Knn::default();
        assert_eq!(knn.predict(&[0.0, 0.0], None), Err(PredictErr::ModelNotTrained));
    }

    #[test]
    fn test_width_mismatch() {
        let mut knn = Knn::default();
        knn.train(&examples()).unwrap();

        assert_eq!(
            knn.predict(&[0.0], None),
            Err(PredictErr::FeatureWidthMismatch {
                got: 1,
                expected: 2
            })
        );
    }

    #[test]
    fn test_failed_training_keeps_previous_model() {
        let mut knn = Knn::default();
        knn.train(&examples()).unwrap();
        let before = knn.clone();

        let ragged = [
            Example::new(vec![0.0], vec![1.0]),
            Example::new(vec![0.0, 1.0], vec![1.0]),
        ];
        assert!(matches!(
            knn.train(&ragged),
            Err(TrainErr::FeatureWidthMismatch { .. })
        ));
        assert_eq!(knn.train(&[]), Err(TrainErr::EmptyExampleSet));
        assert_eq!(knn, before);
    }

    #[test]
    fn test_state_records_samples() {
        let mut knn = Knn::default();
        knn.train(&examples()).unwrap();
        let mut state = ModelState::default();

        knn.predict(&[0.0, 0.0], Some(&mut state)).unwrap();
        knn.predict(&[1.0, 1.0], Some(&mut state)).unwrap();
        assert_eq!(state.samples(), 2);
    }
}

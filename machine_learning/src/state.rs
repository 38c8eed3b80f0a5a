use std::{collections::VecDeque, num::NonZeroUsize};

const DEFAULT_WINDOW: usize = 32;

/// The running context of one streaming session against a model.
///
/// Keeps a bounded window of the most recent feature vectors (used by series
/// models) and, optionally, an exponentially smoothed copy of the outputs so
/// that consecutive samples don't jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    window: NonZeroUsize,
    history: VecDeque<Vec<f32>>,
    smoothing: Option<f32>,
    smoothed: Option<Vec<f32>>,
    samples: u64,
}

impl Default for ModelState {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_WINDOW).unwrap_or(NonZeroUsize::MIN))
    }
}

impl ModelState {
    /// Creates a new `ModelState`.
    ///
    /// # Arguments
    /// * `window` - The maximum amount of feature vectors kept in the history.
    pub fn new(window: NonZeroUsize) -> Self {
        Self {
            window,
            history: VecDeque::with_capacity(window.get()),
            smoothing: None,
            smoothed: None,
            samples: 0,
        }
    }

    /// Enables exponential smoothing of the outputs.
    ///
    /// # Arguments
    /// * `alpha` - Weight of the newest output, clamped to `(0, 1]`. A value of `1` disables smoothing.
    pub fn with_smoothing(mut self, alpha: f32) -> Self {
        self.smoothing = match alpha {
            a if a.is_nan() || a >= 1.0 => None,
            a => Some(a.max(f32::EPSILON)),
        };
        self
    }

    pub fn window(&self) -> usize {
        self.window.get()
    }

    /// The amount of feature vectors observed since the last reset.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// The feature vectors currently in the window, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &[f32]> {
        self.history.iter().map(Vec::as_slice)
    }

    /// Pushes a new feature vector into the window.
    ///
    /// A vector with a different width than the ones in the window starts a new stream.
    pub fn push(&mut self, inputs: &[f32]) {
        if self.history.back().is_some_and(|last| last.len() != inputs.len()) {
            self.history.clear();
            self.smoothed = None;
        }

        if self.history.len() == self.window.get() {
            self.history.pop_front();
        }

        self.history.push_back(inputs.to_vec());
        self.samples += 1;
    }

    /// Blends a new raw output with the previous ones.
    ///
    /// # Arguments
    /// * `raw` - The output the model produced for the latest sample.
    ///
    /// # Returns
    /// The smoothed output, or `raw` itself if smoothing is disabled.
    pub fn smooth(&mut self, raw: Vec<f32>) -> Vec<f32> {
        let Some(alpha) = self.smoothing else {
            return raw;
        };

        let blended = match self.smoothed.take() {
            Some(prev) if prev.len() == raw.len() => raw
                .iter()
                .zip(&prev)
                .map(|(r, p)| alpha * r + (1.0 - alpha) * p)
                .collect(),
            _ => raw,
        };

        self.smoothed = Some(blended.clone());
        blended
    }

    /// Records a sample and its output, returning the output as the caller should see it.
    pub fn observe(&mut self, inputs: &[f32], raw: Vec<f32>) -> Vec<f32> {
        self.push(inputs);
        self.smooth(raw)
    }

    /// Forgets the window, the smoothing memory and the sample count.
    pub fn reset(&mut self) {
        self.history.clear();
        self.smoothed = None;
        self.samples = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(window: usize) -> ModelState {
        ModelState::new(NonZeroUsize::new(window).unwrap())
    }

    #[test]
    fn test_window_drops_oldest() {
        let mut state = state(2);
        state.push(&[1.0]);
        state.push(&[2.0]);
        state.push(&[3.0]);

        let history: Vec<_> = state.history().map(|x| x[0]).collect();
        assert_eq!(history, vec![2.0, 3.0]);
        assert_eq!(state.samples(), 3);
    }

    #[test]
    fn test_width_change_restarts_stream() {
        let mut state = state(4);
        state.push(&[1.0, 1.0]);
        state.push(&[2.0, 2.0]);
        state.push(&[3.0]);

        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn test_smoothing_blends_outputs() {
        let mut state = state(4).with_smoothing(0.5);

        assert_eq!(state.smooth(vec![0.0]), vec![0.0]);
        assert_eq!(state.smooth(vec![1.0]), vec![0.5]);
        assert_eq!(state.smooth(vec![1.0]), vec![0.75]);
    }

    #[test]
    fn test_full_alpha_disables_smoothing() {
        let mut state = state(4).with_smoothing(1.0);

        state.smooth(vec![0.0]);
        assert_eq!(state.smooth(vec![1.0]), vec![1.0]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = state(4).with_smoothing(0.5);
        state.observe(&[1.0], vec![1.0]);
        state.reset();

        assert_eq!(state.samples(), 0);
        assert_eq!(state.history().len(), 0);
        assert_eq!(state.smooth(vec![0.0]), vec![0.0]);
    }
}

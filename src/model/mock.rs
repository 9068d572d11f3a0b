//! Deterministic stand-in for the network
//!
//! Scores depend only on the seed and the tensor contents: the seed is mixed
//! with the tensor fingerprint, a ChaCha8 stream draws three values in
//! `[0.1, 0.9)`, and the draws are normalized to sum to one.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use super::Classifier;
use crate::config::ClassifierVariant;
use crate::inference::preprocess::ImageTensor;
use crate::inference::scores::ScoreVector;
use crate::labels::NUM_CLASSES;
use crate::utils::error::Result;

/// Seed used when the configuration does not name one
pub const DEFAULT_MOCK_SEED: u64 = 42;

const SCORE_RANGE: std::ops::Range<f32> = 0.1..0.9;

#[derive(Debug, Clone)]
pub struct MockClassifier {
    seed: u64,
}

impl MockClassifier {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MOCK_SEED)
    }
}

impl Classifier for MockClassifier {
    fn variant(&self) -> ClassifierVariant {
        ClassifierVariant::Mock
    }

    fn predict(&self, input: &ImageTensor) -> Result<ScoreVector> {
        let fingerprint = input.fingerprint();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ fingerprint);

        let raw: [f32; NUM_CLASSES] = std::array::from_fn(|_| rng.gen_range(SCORE_RANGE));
        let total: f32 = raw.iter().sum();
        trace!(fingerprint, ?raw, "mock draw");

        ScoreVector::new(raw.map(|v| v / total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::preprocess::TENSOR_LEN;
    use crate::inference::scores::SUM_TOLERANCE;

    fn tensor(value: f32) -> ImageTensor {
        ImageTensor::from_vec(vec![value; TENSOR_LEN]).unwrap()
    }

    #[test]
    fn test_same_input_same_scores() {
        let mock = MockClassifier::default();
        let input = tensor(1.0);
        assert_eq!(mock.predict(&input).unwrap(), mock.predict(&input).unwrap());
        assert_eq!(
            mock.predict(&input).unwrap(),
            MockClassifier::new(DEFAULT_MOCK_SEED).predict(&input).unwrap()
        );
    }

    #[test]
    fn test_scores_are_a_distribution_with_bounded_spread() {
        let mock = MockClassifier::new(7);
        for value in [0.0, 0.1, 0.5, 0.9, 1.0] {
            let scores = mock.predict(&tensor(value)).unwrap();
            let sum: f32 = scores.as_array().iter().sum();
            assert!((sum - 1.0).abs() < SUM_TOLERANCE);

            // Draws in [0.1, 0.9) bound every normalized score away from 0 and 1
            let min_share = 0.1 / (0.1 + 0.9 + 0.9);
            let max_share = 0.9 / (0.9 + 0.1 + 0.1);
            assert!(scores.as_array().iter().all(|s| *s > min_share && *s < max_share));
        }
    }

    #[test]
    fn test_seed_and_input_change_scores() {
        let input = tensor(0.5);
        let a = MockClassifier::new(1).predict(&input).unwrap();
        let b = MockClassifier::new(2).predict(&input).unwrap();
        assert_ne!(a, b);

        let c = MockClassifier::new(1).predict(&tensor(0.25)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_reports_mock_variant() {
        assert_eq!(MockClassifier::default().variant(), ClassifierVariant::Mock);
    }
}

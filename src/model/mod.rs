//! Model module for the chest X-ray classifier using the Burn framework
//!
//! This module provides:
//! - the InceptionV3 feature extractor and the SE attention head
//! - the [`Classifier`] prediction contract with a real and a mock variant
//! - the process-wide [`ModelHandle`] chosen from configuration

pub mod classifier;
pub mod handle;
pub mod inception;
pub mod mock;
pub mod se_block;

// Re-export main types for convenience
pub use classifier::{LungClassifier, LungClassifierConfig, RealClassifier};
pub use handle::ModelHandle;
pub use mock::MockClassifier;

use crate::config::ClassifierVariant;
use crate::inference::preprocess::ImageTensor;
use crate::inference::scores::ScoreVector;
use crate::utils::error::Result;

/// A prediction unit shared read-only by concurrent requests
pub trait Classifier: Send + Sync {
    /// Per-class probabilities for one preprocessed image
    fn predict(&self, input: &ImageTensor) -> Result<ScoreVector>;

    /// Which implementation this is
    fn variant(&self) -> ClassifierVariant;
}

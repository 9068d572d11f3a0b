//! Per-class probability vector
//!
//! A [`ScoreVector`] can only be built from values that form a probability
//! distribution over [`ClassLabel`]s, so downstream code never re-checks it.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::labels::{ClassLabel, NUM_CLASSES};
use crate::utils::error::{LungScanError, Result};

/// Maximum allowed distance between the sum of scores and 1.0
pub const SUM_TOLERANCE: f32 = 1e-4;

/// Probabilities positionally aligned to [`ClassLabel`] ordinals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreVector([f32; NUM_CLASSES]);

impl ScoreVector {
    /// Validate a probability vector
    pub fn new(scores: [f32; NUM_CLASSES]) -> Result<Self> {
        if let Some(bad) = scores.iter().find(|s| !s.is_finite() || **s < 0.0) {
            return Err(LungScanError::Inference(format!(
                "score {} is not a non-negative finite probability",
                bad
            )));
        }

        let sum: f32 = scores.iter().sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(LungScanError::Inference(format!(
                "scores sum to {:.6}, expected 1.0",
                sum
            )));
        }

        Ok(Self(scores))
    }

    /// Validate a slice coming out of a model
    pub fn from_slice(scores: &[f32]) -> Result<Self> {
        let array: [f32; NUM_CLASSES] = scores.try_into().map_err(|_| {
            LungScanError::Inference(format!(
                "expected {} scores, got {}",
                NUM_CLASSES,
                scores.len()
            ))
        })?;
        Self::new(array)
    }

    /// Numerically stable softmax over raw logits
    pub fn from_logits(logits: [f32; NUM_CLASSES]) -> Result<Self> {
        let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exps = logits.map(|l| (l - max).exp());
        let total: f32 = exps.iter().sum();
        Self::new(exps.map(|e| e / total))
    }

    /// Score for a single label
    pub fn get(&self, label: ClassLabel) -> f32 {
        self.0[label.index()]
    }

    /// Raw scores in ordinal order
    pub fn as_array(&self) -> &[f32; NUM_CLASSES] {
        &self.0
    }

    /// Label with the highest score; exact ties go to the lowest ordinal
    pub fn argmax(&self) -> (ClassLabel, f32) {
        let mut best = 0;
        for i in 1..NUM_CLASSES {
            if self.0[i] > self.0[best] {
                best = i;
            }
        }
        (ClassLabel::ALL[best], self.0[best])
    }

    /// Labels with their scores, highest first (stable for ties)
    pub fn ranked(&self) -> Vec<(ClassLabel, f32)> {
        let mut ranked: Vec<(ClassLabel, f32)> = ClassLabel::ALL
            .iter()
            .map(|&label| (label, self.get(label)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

/// Serialized as `{ "Lung Opacity": p, "Normal": p, "Viral Pneumonia": p }`
impl Serialize for ScoreVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(NUM_CLASSES))?;
        for label in ClassLabel::ALL {
            map.serialize_entry(label.name(), &self.get(label))?;
        }
        map.end()
    }
}

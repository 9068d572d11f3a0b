//! Diagnostic class labels
//!
//! The ordinal order is the alphabetical directory order of the training
//! data and MUST match the output layer of every weight artifact.

use serde::{Deserialize, Serialize};

/// Number of diagnostic classes
pub const NUM_CLASSES: usize = 3;

/// One of the three closed diagnostic categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassLabel {
    #[serde(rename = "Lung Opacity")]
    LungOpacity = 0,
    #[serde(rename = "Normal")]
    Normal = 1,
    #[serde(rename = "Viral Pneumonia")]
    ViralPneumonia = 2,
}

impl ClassLabel {
    /// All labels in ordinal order
    pub const ALL: [ClassLabel; NUM_CLASSES] = [
        ClassLabel::LungOpacity,
        ClassLabel::Normal,
        ClassLabel::ViralPneumonia,
    ];

    /// Ordinal index used by the score vector and the model output
    pub fn index(self) -> usize {
        self as usize
    }

    /// Label for an ordinal index
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            ClassLabel::LungOpacity => "Lung Opacity",
            ClassLabel::Normal => "Normal",
            ClassLabel::ViralPneumonia => "Viral Pneumonia",
        }
    }
}

impl std::fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_stable() {
        assert_eq!(ClassLabel::LungOpacity.index(), 0);
        assert_eq!(ClassLabel::Normal.index(), 1);
        assert_eq!(ClassLabel::ViralPneumonia.index(), 2);

        for (i, label) in ClassLabel::ALL.iter().enumerate() {
            assert_eq!(ClassLabel::from_index(i), Some(*label));
        }
        assert_eq!(ClassLabel::from_index(NUM_CLASSES), None);
    }

    #[test]
    fn test_serializes_as_display_name() {
        let json = serde_json::to_string(&ClassLabel::ViralPneumonia).unwrap();
        assert_eq!(json, "\"Viral Pneumonia\"");

        let back: ClassLabel = serde_json::from_str("\"Lung Opacity\"").unwrap();
        assert_eq!(back, ClassLabel::LungOpacity);
    }
}

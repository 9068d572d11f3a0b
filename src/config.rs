//! Service configuration
//!
//! Loaded once at startup from an optional JSON file, then overridden by
//! CLI flags. Static for the lifetime of the process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::inference::preprocess::PreprocessConfig;
use crate::model::mock::DEFAULT_MOCK_SEED;
use crate::utils::error::{LungScanError, Result};

/// Default upload limit: 16 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Which [`Classifier`](crate::model::Classifier) implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierVariant {
    /// InceptionV3 + SE head loaded from a weight artifact
    #[default]
    Real,
    /// Deterministic mock, no network
    Mock,
}

impl ClassifierVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierVariant::Real => "real",
            ClassifierVariant::Mock => "mock",
        }
    }
}

impl fmt::Display for ClassifierVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifierVariant {
    type Err = LungScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "real" => Ok(ClassifierVariant::Real),
            "mock" => Ok(ClassifierVariant::Mock),
            other => Err(LungScanError::Config(format!(
                "unknown classifier '{}', expected 'real' or 'mock'",
                other
            ))),
        }
    }
}

/// Configuration of the prediction pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Classifier to load
    pub classifier: ClassifierVariant,

    /// Burn CompactRecorder weight file
    pub weights_path: PathBuf,

    /// Architecture config; defaults to `model_config.json` beside the weights
    pub model_config_path: Option<PathBuf>,

    /// Serve mock predictions when the real model cannot be loaded
    pub allow_mock_fallback: bool,

    /// Seed of the mock classifier
    pub mock_seed: u64,

    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,

    /// Image preprocessing options
    pub preprocess: PreprocessConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierVariant::Real,
            weights_path: PathBuf::from("models/model.mpk"),
            model_config_path: None,
            allow_mock_fallback: false,
            mock_seed: DEFAULT_MOCK_SEED,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            preprocess: PreprocessConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Configuration that serves the mock classifier
    pub fn mock() -> Self {
        Self {
            classifier: ClassifierVariant::Mock,
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(LungScanError::Config(
                "max_upload_bytes must be greater than 0".to_string(),
            ));
        }
        if self.classifier == ClassifierVariant::Real
            && self.weights_path.as_os_str().is_empty()
        {
            return Err(LungScanError::Config(
                "weights_path is required for the real classifier".to_string(),
            ));
        }
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file; missing keys take defaults
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::preprocess::ResizeFilter;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.classifier, ClassifierVariant::Real);
        assert_eq!(config.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(config.mock_seed, 42);
        assert!(!config.allow_mock_fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = ServiceConfig {
            max_upload_bytes: 0,
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServiceConfig {
            weights_path: PathBuf::new(),
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(ServiceConfig { weights_path: PathBuf::new(), ..ServiceConfig::mock() }
            .validate()
            .is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.json");
        std::fs::write(
            &path,
            r#"{ "classifier": "mock", "mock_seed": 7, "preprocess": { "filter": "nearest" } }"#,
        )
        .unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.classifier, ClassifierVariant::Mock);
        assert_eq!(config.mock_seed, 7);
        assert_eq!(config.preprocess.filter, ResizeFilter::Nearest);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_save_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.json");

        let config = ServiceConfig {
            allow_mock_fallback: true,
            max_upload_bytes: 1024,
            ..ServiceConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = ServiceConfig::load(&path).unwrap();
        assert!(loaded.allow_mock_fallback);
        assert_eq!(loaded.max_upload_bytes, 1024);
    }

    #[test]
    fn test_variant_parsing() {
        assert_eq!("MOCK".parse::<ClassifierVariant>().unwrap(), ClassifierVariant::Mock);
        assert_eq!("real".parse::<ClassifierVariant>().unwrap(), ClassifierVariant::Real);
        assert!("keras".parse::<ClassifierVariant>().is_err());
        assert_eq!(ClassifierVariant::Mock.to_string(), "mock");
    }
}

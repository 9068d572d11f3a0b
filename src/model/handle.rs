//! Process-wide classifier handle
//!
//! Built once at startup from a [`ServiceConfig`]. Cloning only bumps the
//! reference count of the shared classifier.

use std::path::PathBuf;
use std::sync::Arc;

use burn::config::Config;
use tracing::{info, warn};

use super::classifier::{LungClassifierConfig, RealClassifier};
use super::mock::MockClassifier;
use super::Classifier;
use crate::backend::{backend_name, default_device, DefaultBackend};
use crate::config::{ClassifierVariant, ServiceConfig};
use crate::utils::error::{LungScanError, Result};

#[derive(Clone)]
pub struct ModelHandle {
    classifier: Arc<dyn Classifier>,
    weights_path: Option<PathBuf>,
    fallback: bool,
}

impl ModelHandle {
    /// Wrap an already constructed classifier
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier,
            weights_path: None,
            fallback: false,
        }
    }

    /// Build the classifier named by `config`
    ///
    /// A real classifier that fails to load is replaced by the mock only when
    /// `allow_mock_fallback` is set; otherwise the `ModelLoad` error is returned.
    pub fn load(config: &ServiceConfig) -> Result<Self> {
        config.validate()?;

        match config.classifier {
            ClassifierVariant::Mock => {
                info!(seed = config.mock_seed, "Using mock classifier");
                Ok(Self::new(Arc::new(MockClassifier::new(config.mock_seed))))
            }
            ClassifierVariant::Real => match Self::load_real(config) {
                Ok(real) => {
                    info!(
                        weights = ?config.weights_path,
                        backend = backend_name(),
                        num_params = real.num_params(),
                        "Real classifier ready"
                    );
                    Ok(Self {
                        classifier: Arc::new(real),
                        weights_path: Some(config.weights_path.clone()),
                        fallback: false,
                    })
                }
                Err(e) if config.allow_mock_fallback => {
                    warn!(error = %e, "Real classifier unavailable, falling back to mock");
                    Ok(Self {
                        classifier: Arc::new(MockClassifier::new(config.mock_seed)),
                        weights_path: None,
                        fallback: true,
                    })
                }
                Err(e) => Err(e),
            },
        }
    }

    fn load_real(config: &ServiceConfig) -> Result<RealClassifier<DefaultBackend>> {
        let model_config = match &config.model_config_path {
            Some(path) => Some(
                LungClassifierConfig::load(path)
                    .map_err(|e| LungScanError::ModelLoad(format!("{:?}: {:?}", path, e)))?,
            ),
            None => LungClassifierConfig::load_beside(&config.weights_path)?,
        }
        .unwrap_or_else(LungClassifierConfig::new);

        RealClassifier::load(&config.weights_path, &model_config, default_device())
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    pub fn variant(&self) -> ClassifierVariant {
        self.classifier.variant()
    }

    pub fn weights_path(&self) -> Option<&PathBuf> {
        self.weights_path.as_ref()
    }

    /// True when the real model was requested but the mock is serving
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("variant", &self.variant())
            .field("weights_path", &self.weights_path)
            .field("fallback", &self.fallback)
            .finish()
    }
}

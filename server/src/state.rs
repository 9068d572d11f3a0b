//! Application state for the LungScan server
//!
//! Holds the server configuration and the prediction service built once at
//! startup. Requests only read from it.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lungscan::{PredictionService, ServiceConfig};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Extra body allowance for multipart boundaries and headers
pub const MULTIPART_SLACK_BYTES: usize = 64 * 1024;

/// Server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Per-request inference deadline
    pub request_timeout_secs: u64,
    /// Prediction pipeline settings
    pub service: ServiceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            request_timeout_secs: 30,
            service: ServiceConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file; missing keys take defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make every request fail
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be at least 1");
        }
        self.service.validate()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Transport-level body limit; the service enforces the exact upload limit
    pub fn body_limit(&self) -> usize {
        self.service.max_upload_bytes + MULTIPART_SLACK_BYTES
    }
}

/// Whether predictions can be served
pub enum ModelState {
    Ready(Arc<PredictionService>),
    Unavailable(String),
}

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Loaded model, or the reason it is missing
    pub model: ModelState,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn ready(config: ServerConfig, service: PredictionService) -> Self {
        Self {
            config,
            model: ModelState::Ready(Arc::new(service)),
            started_at: Instant::now(),
        }
    }

    pub fn unavailable(config: ServerConfig, reason: impl Into<String>) -> Self {
        Self {
            config,
            model: ModelState::Unavailable(reason.into()),
            started_at: Instant::now(),
        }
    }

    /// The prediction service, or 503 when the model never loaded
    pub fn service(&self) -> Result<Arc<PredictionService>, ApiError> {
        match &self.model {
            ModelState::Ready(service) => Ok(service.clone()),
            ModelState::Unavailable(reason) => Err(ApiError::ServiceUnavailable(reason.clone())),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;

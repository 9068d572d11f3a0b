//! LungScan Prediction Server
//!
//! HTTP API server for chest X-ray classification. Loads the classifier once,
//! then serves predictions and a readiness probe.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lungscan::backend::backend_name;
use lungscan::utils::format_bytes;
use lungscan::utils::logging::{init_logging, LogConfig, LogLevel};
use lungscan::{ClassifierVariant, PredictionService};
use tracing::{error, info, warn};

use lungscan_server::build_router;
use lungscan_server::state::{AppState, ServerConfig};

/// LungScan Prediction Server
#[derive(Parser, Debug)]
#[command(name = "lungscan-server")]
#[command(author = "Warre Snaet")]
#[command(version)]
#[command(about = "HTTP API server for LungScan chest X-ray classification")]
struct Cli {
    /// Server configuration file (JSON)
    #[arg(short, long, env = "LUNGSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "LUNGSCAN_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "LUNGSCAN_HOST")]
    host: Option<String>,

    /// Path to the weight file (.mpk)
    #[arg(short, long, env = "LUNGSCAN_WEIGHTS")]
    weights: Option<PathBuf>,

    /// Serve the deterministic mock classifier
    #[arg(long, env = "LUNGSCAN_MOCK", default_value = "false")]
    mock: bool,

    /// Serve the mock when the weights cannot be loaded
    #[arg(long, env = "LUNGSCAN_ALLOW_MOCK_FALLBACK", default_value = "false")]
    allow_mock_fallback: bool,

    /// Seed of the mock classifier
    #[arg(long, env = "LUNGSCAN_MOCK_SEED")]
    mock_seed: Option<u64>,

    /// Largest accepted upload in bytes
    #[arg(long, env = "LUNGSCAN_MAX_UPLOAD_BYTES")]
    max_upload_bytes: Option<usize>,

    /// Per-request inference deadline in seconds
    #[arg(long, env = "LUNGSCAN_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LUNGSCAN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("Failed to load config from {:?}", path))?,
            None => ServerConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout_secs = secs;
        }

        let service = &mut config.service;
        if let Some(weights) = self.weights {
            service.classifier = ClassifierVariant::Real;
            service.weights_path = weights;
        }
        if self.mock {
            service.classifier = ClassifierVariant::Mock;
        }
        if self.allow_mock_fallback {
            service.allow_mock_fallback = true;
        }
        if let Some(seed) = self.mock_seed {
            service.mock_seed = seed;
        }
        if let Some(limit) = self.max_upload_bytes {
            service.max_upload_bytes = limit;
        }
        config.validate()?;

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::production()
    };
    if let Some(level) = &cli.log_level {
        log_config.level = LogLevel::parse(level);
    }
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    // Build configuration
    let config = cli.into_config()?;

    info!("LungScan Prediction Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Classifier:  {}", config.service.classifier);
    info!("  Weights:     {:?}", config.service.weights_path);
    info!("  Fallback:    {}", config.service.allow_mock_fallback);
    info!("  Max upload:  {}", format_bytes(config.service.max_upload_bytes));
    info!("  Timeout:     {}s", config.request_timeout_secs);
    info!("  Backend:     {}", backend_name());

    // Load the model before accepting traffic
    let service_config = config.service.clone();
    let service = tokio::task::spawn_blocking(move || PredictionService::from_config(&service_config))
        .await
        .context("Model loading task failed")?
        .map_err(|e| {
            error!(error = %e, "Model failed to load and no mock fallback is configured");
            e
        })
        .context("Refusing to start without a classifier")?;

    if service.handle().is_fallback() {
        warn!("Serving MOCK predictions: the real model could not be loaded");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    // Create shared state
    let state = Arc::new(AppState::ready(config, service));

    // Build router
    let app = build_router(state);

    // Start server
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_apply() {
        let cli = Cli::parse_from(["lungscan-server", "--mock", "--port", "8080"]);
        let config = cli.into_config().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.service.classifier, ClassifierVariant::Mock);
    }

    #[test]
    fn test_cli_rejects_zero_timeout() {
        let cli = Cli::parse_from(["lungscan-server", "--mock", "--request-timeout-secs", "0"]);
        assert!(cli.into_config().is_err());
    }
}

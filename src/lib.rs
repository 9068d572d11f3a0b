//! # LungScan
//!
//! Chest X-ray classification into Normal, Lung Opacity and Viral Pneumonia
//! using the Burn framework.
//!
//! ## Modules
//!
//! - `inference`: image preprocessing, the prediction service and benchmarking
//! - `model`: InceptionV3 backbone, SE attention head, real and mock classifiers
//! - `config`: service configuration
//! - `labels`: the closed set of diagnostic labels
//! - `utils`: logging and error handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lungscan::{PredictionService, ServiceConfig};
//!
//! let service = PredictionService::from_config(&ServiceConfig::mock())?;
//! let result = service.classify(&std::fs::read("xray.png")?)?;
//! println!("{}", result.display());
//! ```

pub mod backend;
pub mod config;
pub mod inference;
pub mod labels;
pub mod model;
pub mod utils;

// Re-export commonly used items for convenience
pub use config::{ClassifierVariant, ServiceConfig};
pub use inference::benchmark::BenchmarkResult;
pub use inference::preprocess::{ImagePreprocessor, ImageTensor};
pub use inference::scores::ScoreVector;
pub use inference::service::{PredictionResult, PredictionService};
pub use labels::{ClassLabel, NUM_CLASSES};
pub use model::{Classifier, ModelHandle};
pub use utils::error::{LungScanError, Result};

/// Side length of the network input
pub const IMAGE_SIZE: usize = inference::preprocess::INPUT_SIZE;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Inference module: preprocessing, prediction and benchmarking
//!
//! This module provides:
//! - Upload decoding and normalization into the network input tensor
//! - The validated per-class score vector
//! - The prediction service shared by the CLI and the HTTP server
//! - Latency benchmarking

pub mod benchmark;
pub mod preprocess;
pub mod scores;
pub mod service;

// Re-export main types for convenience
pub use benchmark::{run_benchmark, BenchmarkConfig, BenchmarkResult, LatencyStats, Timer};
pub use preprocess::{ImagePreprocessor, ImageTensor, PreprocessConfig, ResizeFilter};
pub use scores::ScoreVector;
pub use service::{PredictionResult, PredictionService};

/// Default number of warmup iterations for benchmarking
pub const WARMUP_ITERATIONS: usize = 10;

/// Default number of benchmark iterations
pub const BENCHMARK_ITERATIONS: usize = 100;

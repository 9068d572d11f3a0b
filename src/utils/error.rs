//! Error Handling Module
//!
//! Defines the error taxonomy of the classification pipeline.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Main error type for LungScan operations
#[derive(Error, Debug)]
pub enum LungScanError {
    /// Payload is empty, not a supported raster format, or fails to decode
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Upload exceeds the configured limit (checked before decoding)
    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Weight artifact missing, corrupt, or incompatible with the architecture
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Unexpected failure inside the network forward pass
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LungScanError {
    /// True for errors caused by the caller's input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LungScanError::InvalidImage(_) | LungScanError::PayloadTooLarge { .. }
        )
    }
}

impl From<serde_json::Error> for LungScanError {
    fn from(err: serde_json::Error) -> Self {
        LungScanError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for LungScanError {
    fn from(err: image::ImageError) -> Self {
        LungScanError::InvalidImage(err.to_string())
    }
}

/// Convenience Result type for LungScan operations
pub type Result<T> = std::result::Result<T, LungScanError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Turn any error into a `ModelLoad` error with context
    fn model_load_context(self, msg: &str) -> Result<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    fn model_load_context(self, msg: &str) -> Result<T> {
        self.map_err(|e| LungScanError::ModelLoad(format!("{}: {:?}", msg, e)))
    }
}

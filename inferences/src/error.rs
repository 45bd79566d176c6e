//! Error types for mastitis inference.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while preparing inputs or running a classifier
#[derive(Error, Debug)]
pub enum InferenceError {
    /// A required input is absent; no model was called
    #[error("{0}")]
    MissingInput(String),

    /// Uploaded payload is not a PNG or JPEG image
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Model expects a channel count other than 1 or 3
    #[error("Unsupported channels: {0}")]
    UnsupportedChannels(usize),

    /// Image bytes could not be decoded
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Model file could not be loaded or prepared
    #[error("Failed to load model at '{0}': {1}")]
    ModelLoad(PathBuf, String),

    /// Model execution failed
    #[error("Model error: {0}")]
    Model(String),

    /// Model produced no value or a non-finite value
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
}

impl InferenceError {
    /// Whether the error is a refused request rather than a failure
    pub fn is_missing_input(&self) -> bool {
        matches!(self, InferenceError::MissingInput(_))
    }

    /// Whether the error was caused by the uploaded image itself
    pub fn is_bad_image(&self) -> bool {
        matches!(
            self,
            InferenceError::UnsupportedFormat(_) | InferenceError::Decode(_)
        )
    }
}

/// Convenience Result type for inference operations
pub type Result<T> = std::result::Result<T, InferenceError>;

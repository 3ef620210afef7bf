//! Error types for modelbridge-rs.

use thiserror::Error;

/// Result type alias for modelbridge-rs operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur while loading or calling a native model.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Model loading failed (missing artifact, bad artifact, missing native runtime).
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    /// Paired inputs have different lengths.
    #[error("Shape mismatch: input lengths differ ({left} vs {right})")]
    ShapeMismatch { left: usize, right: usize },

    /// Paired batches have different outer lengths.
    #[error("Batch size mismatch: {left} vs {right} items")]
    BatchSizeMismatch { left: usize, right: usize },

    /// The native call itself failed.
    #[error("Invocation failed: {0}")]
    Invocation(String),

    /// The bridge was used after `release()`.
    #[error("Model bridge used after release")]
    UseAfterRelease,

    /// Invalid tensor.
    #[error("Invalid tensor: {0}")]
    Tensor(String),

    /// Invalid argument to a harness operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a model load error.
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create an invocation error.
    pub fn invocation(msg: impl Into<String>) -> Self {
        Self::Invocation(msg.into())
    }

    /// Create a tensor error.
    pub fn tensor(msg: impl Into<String>) -> Self {
        Self::Tensor(msg.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

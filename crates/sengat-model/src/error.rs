//! Error types for the model crate.

use sengat_core::CoreError;
use thiserror::Error;

/// Error type for model construction and forward passes.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A tensor operation failed.
    #[error("Tensor operation failed: {message}")]
    Tensor { message: String },

    /// Invalid model configuration (e.g. embedding dim not divisible by the
    /// head count). Raised once, eagerly, before any weights are built.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A graph-level precondition failed during batch preparation.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ModelError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        ModelError::Configuration {
            message: message.into(),
        }
    }
}

/// Result type alias for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Convert a candle error, preserving its message.
pub(crate) fn map_candle(e: candle_core::Error) -> ModelError {
    ModelError::Tensor {
        message: e.to_string(),
    }
}

//! Error types for the data crate.

use sengat_cache::CacheError;
use sengat_core::CoreError;
use thiserror::Error;

/// Error type for text sources and preprocessing stages.
#[derive(Debug, Error)]
pub enum DataError {
    /// Text source could not be read or parsed.
    #[error("Text source error: {message}")]
    Source { message: String },

    /// An example carried a label absent from the label vocabulary.
    #[error("Unknown label: {label}")]
    UnknownLabel { label: String },

    /// An example produced no tokens.
    #[error("Empty input: {context}")]
    EmptyInput { context: String },

    /// Cache contract violation or storage failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Graph-level precondition failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// File I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataError {
    pub(crate) fn source(message: impl Into<String>) -> Self {
        DataError::Source {
            message: message.into(),
        }
    }
}

/// Result type alias for data operations.
pub type DataResult<T> = Result<T, DataError>;

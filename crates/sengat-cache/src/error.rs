//! Error types for the cache layer.

use thiserror::Error;

/// Error type for cache contract violations and storage failures.
///
/// Contract violations are fatal and surface immediately: silently training
/// on incomplete or stale cached data is worse than failing the run.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A storage-kind name (e.g. a file extension) is not one of the
    /// supported set.
    #[error("Unknown storage kind: {name}")]
    UnknownStorageKind { name: String },

    /// A stage exported a payload whose kind disagrees with the declared
    /// storage kind for that attribute.
    #[error("Storage kind mismatch for attribute {attr}: declared {declared}, got {actual}")]
    StorageKindMismatch {
        attr: String,
        declared: &'static str,
        actual: &'static str,
    },

    /// `process()` finished without binding a declared attribute, or an
    /// attribute was requested that the stage never declared.
    #[error("Missing attribute {attr} on stage {stage}")]
    MissingAttribute { stage: String, attr: String },

    /// A blob was requested that the store does not hold.
    #[error("Not cached: {namespace}/{attr}")]
    NotCached { namespace: String, attr: String },

    /// Serialization or deserialization of a blob failed.
    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    /// Stage-specific computation failed inside `process()`.
    #[error("Stage processing failed: {message}")]
    Process { message: String },

    /// Blob store I/O failed.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Wrap a stage-specific processing failure.
    pub fn process(message: impl Into<String>) -> Self {
        CacheError::Process {
            message: message.into(),
        }
    }

    pub(crate) fn serialization(message: impl Into<String>) -> Self {
        CacheError::Serialization {
            message: message.into(),
        }
    }
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

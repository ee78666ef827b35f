//! Error types for sengat-core.

use thiserror::Error;

/// Top-level error type for core graph operations.
///
/// Violations are raised eagerly at construction time and indicate a caller
/// bug; they are fatal to the current run, never silently coerced.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required precondition did not hold (e.g. a reserved vocabulary id
    /// was already present, or parallel field lengths disagree).
    #[error("Precondition violated: {message}")]
    PrecursorViolation { message: String },

    /// A graph was used before its vocabulary ids were resolved.
    #[error("Graph is not vocabulary-resolved: {context}")]
    UnresolvedGraph { context: String },
}

impl CoreError {
    pub(crate) fn precursor(message: impl Into<String>) -> Self {
        CoreError::PrecursorViolation {
            message: message.into(),
        }
    }
}

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

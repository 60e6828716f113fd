//! Error types for the data model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while (de)serializing model types.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A serialized target carried a query-type tag nobody registered.
    #[error("unknown query type: {0}")]
    UnknownQueryType(String),

    /// A persisted sync state could not be reconstructed.
    #[error("malformed sync state: {0}")]
    MalformedState(String),

    /// A serialized target could not be reconstructed.
    #[error("malformed sync target: {0}")]
    MalformedTarget(String),
}

impl ModelError {
    /// Creates a malformed-state error from any serde failure.
    pub fn state(err: impl std::fmt::Display) -> Self {
        Self::MalformedState(err.to_string())
    }

    /// Creates a malformed-target error from any serde failure.
    pub fn target(err: impl std::fmt::Display) -> Self {
        Self::MalformedTarget(err.to_string())
    }
}

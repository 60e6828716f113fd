//! Error types for the sync engine.

use soupsync_model::ModelError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for local-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The server answered with a non-success status.
    #[error("transport error: status {status}: {message}")]
    Transport {
        /// HTTP status code.
        status: u16,
        /// Error message or response body excerpt.
        message: String,
    },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// A server response did not have the expected shape.
    #[error("malformed server response: {0}")]
    MalformedResponse(String),

    /// Local-store failure during sync.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Model (de)serialization failure.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A custom target tag nobody registered a factory for.
    #[error("unknown custom target tag: {0}")]
    UnknownCustomTarget(String),

    /// A target that cannot be run (wrong shape for its sync type).
    #[error("invalid sync target: {0}")]
    InvalidTarget(String),

    /// No sync state exists under this id.
    #[error("unknown sync id: {0}")]
    UnknownSync(i64),

    /// The sync is already running and cannot be re-run yet.
    #[error("sync {0} is already running")]
    AlreadyRunning(i64),

    /// A dirty record is missing what the push needs (object type, id).
    #[error("record cannot be pushed: {0}")]
    UnpushableRecord(String),
}

impl SyncError {
    /// Creates a transport error from a status code and message.
    pub fn transport(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Creates a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Returns true if this is a 404 from the server.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Transport { status: 404, .. })
    }
}

/// Errors surfaced by a local document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The soup was never registered.
    #[error("soup not registered: {0}")]
    SoupNotFound(String),

    /// No entry exists at the given row id.
    #[error("entry {entry_id} not found in soup {soup}")]
    EntryNotFound {
        /// Soup name.
        soup: String,
        /// Soup entry id.
        entry_id: i64,
    },

    /// The record cannot be stored (e.g. not a JSON object).
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Any other storage-engine failure.
    #[error("store failure: {0}")]
    Internal(String),
}

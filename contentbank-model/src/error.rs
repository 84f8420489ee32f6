//! Errors raised by collaborators (store, lock service, audit sink).

use thiserror::Error;

/// Result type for collaborator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in collaborator operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Record cannot be removed because it still has usage history.
    #[error("still in use: {0}")]
    InUse(String),

    /// Lock service failure (not a timeout).
    #[error("lock error: {0}")]
    Lock(String),

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

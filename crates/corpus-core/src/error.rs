//! Error types for the corpus knowledge base.

use thiserror::Error;

/// Result type alias using corpus's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for corpus operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error).
    ///
    /// This is the transient-infrastructure case: callers in the edit path
    /// surface it immediately, and only the job retry policy re-attempts it.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(uuid::Uuid),

    /// Chunk not found
    #[error("Chunk not found: {0}")]
    ChunkNotFound(uuid::Uuid),

    /// Chunk version not found
    #[error("Version not found: {0}")]
    VersionNotFound(uuid::Uuid),

    /// Malformed input, surfaced immediately
    #[error("Validation error: {0}")]
    Validation(String),

    /// Optimistic-concurrency check failed; caller must retry with fresh state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

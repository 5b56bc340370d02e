//! Common error types used throughout segcache.
//!
//! The cache treats every storage failure as recoverable: callers inside the
//! workspace use these variants to decide whether to log, degrade to a miss,
//! or disable caching for the rest of the session.

/// Common error type for segcache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Persistent storage could not be opened. Disables caching for the session.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A single put/delete/clear failed.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// A single read failed. Callers treat this as a miss.
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// A database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new StoreUnavailable error.
    pub fn store_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a new WriteFailed error.
    pub fn write_failed<S: Into<String>>(msg: S) -> Self {
        Self::WriteFailed(msg.into())
    }

    /// Create a new ReadFailed error.
    pub fn read_failed<S: Into<String>>(msg: S) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// Create a new Database error.
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for Tunestream core operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad error category, for callers that branch on the kind of failure
/// rather than its details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Remote content service failed (network, parsing, upstream error).
    Remote,
    /// A remote call did not finish within its time budget.
    Timeout,
    /// Local library store failed.
    Store,
    /// Input rejected before any call was made.
    Validation,
    /// A single-flight operation is already running.
    Busy,
    /// Requested entity does not exist.
    NotFound,
    /// Player engine rejected a command.
    Player,
    /// Configuration could not be loaded, saved or validated.
    Configuration,
    /// File system or IO failure.
    FileSystem,
    /// JSON (de)serialization failure.
    Serialization,
}

/// Errors that can occur in Tunestream core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote content service call failed.
    #[error("Remote request failed: {0}")]
    Remote(String),

    /// Remote call exceeded its timeout.
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        /// Name of the timed out operation.
        operation: String,
        /// The timeout that elapsed.
        after: Duration,
    },

    /// Local store operation failed.
    #[error("Library store error: {0}")]
    Store(String),

    /// Input validation failed.
    #[error("{0}")]
    Validation(String),

    /// Operation is already in progress.
    #[error("{0} is already in progress")]
    Busy(String),

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Player engine error.
    #[error("Player error: {0}")]
    Player(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// File system operation failed.
    #[error("File system error at {path}: {message}")]
    FileSystem {
        /// Path where the error occurred.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a remote error from any displayable cause.
    pub fn remote(cause: impl std::fmt::Display) -> Self {
        Self::Remote(cause.to_string())
    }

    /// Create a store error from any displayable cause.
    pub fn store(cause: impl std::fmt::Display) -> Self {
        Self::Store(cause.to_string())
    }

    /// Create a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Get the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Remote(_) => ErrorKind::Remote,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Store(_) => ErrorKind::Store,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Busy(_) => ErrorKind::Busy,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Player(_) => ErrorKind::Player,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::FileSystem { .. } | Self::Io(_) => ErrorKind::FileSystem,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Remote | ErrorKind::Timeout)
    }
}

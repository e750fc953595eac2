//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("block not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored block corrupt: expected {expected}, got {actual}")]
    Corrupt { expected: String, actual: String },

    #[error("hot store error: {0}")]
    Hot(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether the error is plausibly transient (worth retrying).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Hot(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

//! Engine error taxonomy.
//!
//! Callers see a closed set of outcomes: bad input, absent entities,
//! lost races, incomplete uploads, retryable infrastructure failures,
//! corruption, and cancellation. Storage and metadata errors are folded
//! into this taxonomy at the engine boundary.

use sealock_metadata::MetadataError;
use sealock_storage::StorageError;
use thiserror::Error;

/// Engine operation errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or contradictory caller input; not retryable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown file, block, session, snapshot, or library; not retryable.
    #[error("not found: {0}")]
    NotFound(String),

    /// A state race was lost; the caller may refetch and retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Finalize attempted with chunks still missing.
    #[error("incomplete upload: {} chunks missing", missing.len())]
    Incomplete {
        /// The missing chunk indices.
        missing: Vec<u32>,
    },

    /// Infrastructure failure that exhausted its retries.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Corruption or an unrecoverable internal error; surfaced immediately.
    #[error("fatal: {0}")]
    Fatal(String),

    /// Caller deadline hit; ephemeral writes may linger until TTL.
    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    /// Whether the engine should retry the operation internally.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(h) => Self::NotFound(format!("block {h}")),
            StorageError::InvalidInput(m) => Self::InvalidInput(m),
            StorageError::Io(e) => Self::Transient(format!("block I/O: {e}")),
            StorageError::Hot(m) => Self::Transient(format!("hot store: {m}")),
            StorageError::Corrupt { expected, actual } => {
                Self::Fatal(format!("stored block corrupt: expected {expected}, got {actual}"))
            }
            StorageError::Config(m) => Self::Fatal(format!("storage config: {m}")),
        }
    }
}

impl From<MetadataError> for EngineError {
    fn from(e: MetadataError) -> Self {
        match e {
            MetadataError::NotFound(m) => Self::NotFound(m),
            MetadataError::AlreadyExists(m) => Self::Conflict(m),
            MetadataError::Database(e) => Self::Transient(format!("metadata store: {e}")),
            MetadataError::Io(e) => Self::Transient(format!("metadata I/O: {e}")),
            MetadataError::Invalid(m) => Self::Fatal(format!("metadata row: {m}")),
            MetadataError::Internal(m) => Self::Fatal(m),
        }
    }
}

impl From<sealock_core::Error> for EngineError {
    fn from(e: sealock_core::Error) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

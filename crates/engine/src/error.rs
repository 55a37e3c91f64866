//! Engine error types.

use hoard_metadata::MetadataError;
use hoard_storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by [`crate::Engine`] operations.
///
/// Remote transport failures never appear here: replication and
/// verification absorb them into their own state.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("invalid replication target: {0}")]
    InvalidReplicationTarget(String),

    #[error("no locations available for {0}")]
    NoLocationsAvailable(String),

    #[error("content not found: {0}")]
    ContentNotFound(String),

    #[error("replication job not found: {0}")]
    JobNotFound(Uuid),

    #[error("advertisement failed: {0}")]
    AdvertisementFailed(String),

    #[error("invalid request: {0}")]
    Invalid(#[from] hoard_core::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::DigestMismatch {
                expected, actual, ..
            } => EngineError::HashMismatch { expected, actual },
            other => EngineError::IoFailure(other.to_string()),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

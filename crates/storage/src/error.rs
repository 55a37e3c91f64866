//! Storage errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    /// The object under a content key does not hash to that key.
    #[error("object {key} is corrupt: expected {expected}, got {actual}")]
    DigestMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote store could not be reached or rejected the request.
    #[error("remote store error: {0}")]
    Remote(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether the store answered but simply does not hold the object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub(crate) fn remote(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Remote(Box::new(e))
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

//! Metadata store errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    /// A row the operation depends on does not exist.
    #[error("missing row: {0}")]
    NotFound(String),

    /// A keyed insert collided with an existing row.
    #[error("duplicate row: {0}")]
    AlreadyExists(String),

    #[error("sqlite: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cannot prepare database location: {0}")]
    Io(#[from] std::io::Error),

    /// A stored column no longer parses into its domain type.
    #[error("row cannot be decoded: {0}")]
    Corrupt(String),

    /// A JSON column failed to encode or decode.
    #[error("json column: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MetadataError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<hoard_core::Error> for MetadataError {
    fn from(err: hoard_core::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparseable_domain_values_are_corrupt_rows() {
        let err = MetadataError::from(hoard_core::Error::InvalidHash("zz".to_string()));
        assert!(matches!(err, MetadataError::Corrupt(ref msg) if msg.contains("zz")));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_bad_json_column() {
        let err: MetadataError = serde_json::from_str::<Vec<String>>("{").unwrap_err().into();
        assert!(err.to_string().starts_with("json column"));
    }
}

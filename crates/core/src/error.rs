//! Parse and validation failures for domain values.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Not 64 lowercase hex digits or a `uhrp://` URL around them.
    #[error("not a content address: {0}")]
    InvalidHash(String),

    #[error("no location kind named {0:?}")]
    UnknownLocation(String),

    #[error("priority {0} is outside 1..=10")]
    InvalidPriority(u8),

    /// A stored or supplied enum name that matches no variant.
    #[error("unrecognized value: {0}")]
    InvalidState(String),

    #[error("cannot encode: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

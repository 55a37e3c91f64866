use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignerError {
    /// Key text is not `name:base64` or decodes to the wrong bytes.
    #[error("malformed key: {0}")]
    KeyParsing(String),

    /// The configured key could not be obtained.
    #[error("signing key unavailable: {0}")]
    KeySource(String),

    /// The bytes to sign could not be produced.
    #[error("cannot build signing payload: {0}")]
    Signing(String),

    #[error("signature does not match payload")]
    VerificationFailed,

    #[error("malformed signature: {0}")]
    InvalidSignature(String),

    #[error("reading key file: {0}")]
    Io(#[from] std::io::Error),
}

pub type SignerResult<T> = std::result::Result<T, SignerError>;

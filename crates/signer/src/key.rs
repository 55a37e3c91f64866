//! Ed25519 keys and their text form.
//!
//! A key is written as `name:base64`. Secret keys carry the 32 secret bytes
//! followed by the 32 public bytes; public keys carry only the latter.

use crate::error::{SignerError, SignerResult};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::fmt;

const PUBLIC_LEN: usize = 32;
const SECRET_TEXT_LEN: usize = 64;

/// Split `name:base64` text into the name and decoded bytes.
fn decode_named(text: &str) -> SignerResult<(String, Vec<u8>)> {
    let Some((name, encoded)) = text.split_once(':') else {
        return Err(SignerError::KeyParsing("missing ':' separator".to_string()));
    };
    if name.trim().is_empty() {
        return Err(SignerError::KeyParsing("key name is empty".to_string()));
    }
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| SignerError::KeyParsing(format!("{name}: {e}")))?;
    Ok((name.to_string(), bytes))
}

fn encode_named(name: &str, bytes: &[u8]) -> String {
    format!("{name}:{}", BASE64.encode(bytes))
}

fn exact<const N: usize>(bytes: &[u8], what: &str) -> SignerResult<[u8; N]> {
    bytes.try_into().map_err(|_| {
        SignerError::KeyParsing(format!("{what} must be {N} bytes, found {}", bytes.len()))
    })
}

pub struct SecretKey(SigningKey);

impl SecretKey {
    pub fn generate() -> Self {
        Self(SigningKey::generate(&mut rand_core::OsRng))
    }

    /// Parse secret key text. The trailing public half must belong to the
    /// secret half.
    pub fn parse(text: &str) -> SignerResult<(String, Self)> {
        let (name, bytes) = decode_named(text)?;
        let bytes: [u8; SECRET_TEXT_LEN] = exact(&bytes, "secret key")?;
        let (secret, public) = bytes.split_at(PUBLIC_LEN);

        let key = SigningKey::from_bytes(&exact(secret, "secret half")?);
        if key.verifying_key().as_bytes().as_slice() != public {
            return Err(SignerError::KeyParsing(format!(
                "{name}: public half belongs to a different key"
            )));
        }
        Ok((name, Self(key)))
    }

    pub fn encode(&self, name: &str) -> String {
        let mut bytes = self.0.to_bytes().to_vec();
        bytes.extend_from_slice(self.0.verifying_key().as_bytes());
        encode_named(name, &bytes)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn parse(text: &str) -> SignerResult<(String, Self)> {
        let (name, bytes) = decode_named(text)?;
        let key = VerifyingKey::from_bytes(&exact(&bytes, "public key")?)
            .map_err(|e| SignerError::KeyParsing(format!("{name}: {e}")))?;
        Ok((name, Self(key)))
    }

    pub fn encode(&self, name: &str) -> String {
        encode_named(name, self.0.as_bytes())
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = BASE64.encode(self.0.as_bytes());
        write!(f, "PublicKey({}..)", &encoded[..8])
    }
}

/// Secret and public key under one name, e.g. `provider.example.com-1`.
pub struct KeyPair {
    pub name: String,
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl KeyPair {
    fn from_parts(name: String, secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self {
            name,
            secret,
            public,
        }
    }

    pub fn generate(name: impl Into<String>) -> Self {
        Self::from_parts(name.into(), SecretKey::generate())
    }

    pub fn from_secret_key(text: &str) -> SignerResult<Self> {
        let (name, secret) = SecretKey::parse(text)?;
        Ok(Self::from_parts(name, secret))
    }

    pub fn to_secret_key_string(&self) -> String {
        self.secret.encode(&self.name)
    }

    pub fn to_public_key_string(&self) -> String {
        self.public.encode(&self.name)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("name", &self.name)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

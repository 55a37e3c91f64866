//! Advertisement signing and verification.

use crate::error::{SignerError, SignerResult};
use crate::key::{KeyPair, PublicKey};
use async_trait::async_trait;
use base64::Engine;
use ed25519_dalek::Signer as _;
use ed25519_dalek::Verifier;
use hoard_core::Advertisement;

/// An identity able to sign payloads on behalf of this node.
///
/// Implementations may call out to a remote wallet or HSM, hence async.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `payload` and return the base64 signature.
    async fn sign(&self, payload: &[u8]) -> SignerResult<String>;

    /// Name of the key that produces the signatures.
    fn key_name(&self) -> &str;
}

/// Local ed25519 signer.
#[derive(Debug)]
pub struct AdvertisementSigner {
    keypair: KeyPair,
}

impl AdvertisementSigner {
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// Create from a `name:base64` secret key string.
    pub fn from_secret_key(s: &str) -> SignerResult<Self> {
        Ok(Self::new(KeyPair::from_secret_key(s)?))
    }

    /// Generate a new signer with a random key.
    pub fn generate(key_name: impl Into<String>) -> Self {
        Self::new(KeyPair::generate(key_name))
    }

    pub fn key_name(&self) -> &str {
        &self.keypair.name
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.keypair.public
    }

    /// The `name:base64` public key to publish alongside advertisements.
    pub fn public_key_string(&self) -> String {
        self.keypair.to_public_key_string()
    }

    /// Sign `payload` synchronously.
    pub fn sign_bytes(&self, payload: &[u8]) -> String {
        let sig = self.keypair.secret.signing_key().sign(payload);
        base64::engine::general_purpose::STANDARD.encode(sig.to_bytes())
    }
}

#[async_trait]
impl Signer for AdvertisementSigner {
    async fn sign(&self, payload: &[u8]) -> SignerResult<String> {
        Ok(self.sign_bytes(payload))
    }

    fn key_name(&self) -> &str {
        AdvertisementSigner::key_name(self)
    }
}

/// Verify a base64 signature over `payload`.
pub fn verify_signature(payload: &[u8], signature: &str, public_key: &PublicKey) -> SignerResult<()> {
    let sig_bytes = base64::engine::general_purpose::STANDARD
        .decode(signature)
        .map_err(|e| SignerError::InvalidSignature(format!("invalid base64: {e}")))?;

    let sig_array: [u8; 64] = sig_bytes.try_into().map_err(|b: Vec<u8>| {
        SignerError::InvalidSignature(format!("expected 64 bytes, got {}", b.len()))
    })?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_array);

    public_key
        .verifying_key()
        .verify(payload, &signature)
        .map_err(|_| SignerError::VerificationFailed)
}

/// Verify the signature carried by an advertisement.
pub fn verify_advertisement(ad: &Advertisement, public_key: &PublicKey) -> SignerResult<()> {
    let signature = ad
        .signature
        .as_deref()
        .ok_or_else(|| SignerError::InvalidSignature("advertisement is unsigned".to_string()))?;
    let payload = ad
        .signing_payload()
        .map_err(|e| SignerError::Signing(e.to_string()))?;
    verify_signature(&payload, signature, public_key)
}

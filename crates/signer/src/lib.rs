//! Identity and signing capability for hoard storage advertisements.
//!
//! This crate provides:
//! - Ed25519 key generation and `name:base64` key encoding
//! - The [`Signer`] capability consumed by the engine
//! - Detached signature verification

pub mod error;
pub mod key;
pub mod signer;

pub use error::{SignerError, SignerResult};
pub use key::{KeyPair, PublicKey, SecretKey};
pub use signer::{AdvertisementSigner, Signer, verify_advertisement, verify_signature};

use hoard_core::config::{PrivateKeyConfig, SigningConfig};

/// Build the advertisement signer described by `config`.
///
/// A key loaded from a file or the environment carries its own name; the
/// configured `key_name` is only used for generated keys.
pub fn from_config(config: &SigningConfig) -> SignerResult<AdvertisementSigner> {
    match &config.private_key {
        PrivateKeyConfig::File { path } => {
            let text = std::fs::read_to_string(path)?;
            AdvertisementSigner::from_secret_key(text.trim())
        }
        PrivateKeyConfig::Env { var } => {
            let text = std::env::var(var)
                .map_err(|e| SignerError::KeySource(format!("{var}: {e}")))?;
            AdvertisementSigner::from_secret_key(text.trim())
        }
        PrivateKeyConfig::Value { key } => AdvertisementSigner::from_secret_key(key.trim()),
        PrivateKeyConfig::Generate => {
            tracing::warn!(
                key_name = %config.key_name,
                "generating an ephemeral signing key; advertisements will not verify after restart"
            );
            Ok(AdvertisementSigner::generate(config.key_name.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_reads_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing.key");
        let original = KeyPair::generate("provider.example-1");
        std::fs::write(&path, format!("{}\n", original.to_secret_key_string())).unwrap();

        let signer = from_config(&SigningConfig {
            key_name: "ignored".to_string(),
            private_key: PrivateKeyConfig::File { path },
        })
        .unwrap();
        assert_eq!(signer.key_name(), "provider.example-1");
        assert_eq!(signer.public_key_string(), original.to_public_key_string());
    }

    #[test]
    fn test_from_config_generate_uses_configured_name() {
        let signer = from_config(&SigningConfig {
            key_name: "dev-1".to_string(),
            private_key: PrivateKeyConfig::Generate,
        })
        .unwrap();
        assert_eq!(signer.key_name(), "dev-1");
    }

    #[test]
    fn test_from_config_missing_env_var() {
        let err = from_config(&SigningConfig {
            key_name: "k".to_string(),
            private_key: PrivateKeyConfig::Env {
                var: "HOARD_TEST_SIGNING_KEY_THAT_IS_NOT_SET".to_string(),
            },
        })
        .unwrap_err();
        assert!(matches!(err, SignerError::KeySource(_)));
    }
}

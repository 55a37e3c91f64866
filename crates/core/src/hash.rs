//! Content addressing.
//!
//! Every piece of content is identified by `<algorithm>:<hex digest>`. Only
//! `sha256` is produced today, but the algorithm prefix is kept in the textual
//! form so the address stays self-describing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Algorithm prefix used in textual content addresses.
pub const SHA256_PREFIX: &str = "sha256";

/// A SHA-256 content address represented as 32 bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentAddress([u8; 32]);

impl ContentAddress {
    /// Compute the address of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Parse `sha256:<hex>` or a bare 64 character hex digest.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let hex = match s.split_once(':') {
            Some((algo, hex)) if algo == SHA256_PREFIX => hex,
            Some((algo, _)) => {
                return Err(crate::Error::InvalidHash(format!(
                    "unsupported hash algorithm: {algo}"
                )));
            }
            None => s,
        };
        Self::from_hex(hex)
    }

    /// Parse from a 64 character hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 64 {
            return Err(crate::Error::InvalidHash(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        // from_str_radix tolerates a leading sign, so check the digits first.
        if let Some(bad) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(crate::Error::InvalidHash(format!("invalid hex digit {bad:?}")));
        }
        let mut bytes = [0u8; 32];
        for (i, pair) in s.as_bytes().chunks(2).enumerate() {
            let hex_str =
                std::str::from_utf8(pair).map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Encode the digest as lowercase hex, without the algorithm prefix.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// The UHRP resolution URL for this content.
    pub fn uhrp_url(&self) -> String {
        format!("uhrp://{}/content", self.to_hex())
    }

    /// Object key used by byte stores, sharded by the first two digest bytes.
    pub fn object_key(&self) -> String {
        let hex = self.to_hex();
        format!("content/{}/{}/{}.bin", &hex[..2], &hex[2..4], hex)
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SHA256_PREFIX}:{}", self.to_hex())
    }
}

impl FromStr for ContentAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ContentAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_prefixed_hex() {
        let addr = ContentAddress::compute(b"hello world");
        let text = addr.to_string();
        assert!(text.starts_with("sha256:"));
        assert_eq!(text.len(), "sha256:".len() + 64);
        assert_eq!(
            text,
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_parse_accepts_prefixed_and_bare() {
        let addr = ContentAddress::compute(b"data");
        assert_eq!(ContentAddress::parse(&addr.to_string()).unwrap(), addr);
        assert_eq!(ContentAddress::parse(&addr.to_hex()).unwrap(), addr);
    }

    #[test]
    fn test_parse_rejects_unknown_algorithm() {
        let hex = ContentAddress::compute(b"data").to_hex();
        let err = ContentAddress::parse(&format!("md5:{hex}")).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidHash(_)));
    }

    #[test]
    fn test_parse_rejects_short_digest() {
        assert!(ContentAddress::parse("sha256:abcd").is_err());
        assert!(ContentAddress::parse(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_parse_rejects_signed_byte_pairs() {
        let err = ContentAddress::parse(&format!("sha256:{}", "+a".repeat(32))).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidHash(ref msg) if msg.contains("'+'")));
        assert!(ContentAddress::from_hex(&format!("{}-1", "0".repeat(62))).is_err());
    }

    #[test]
    fn test_parse_accepts_uppercase_digest() {
        let addr = ContentAddress::compute(b"data");
        assert_eq!(ContentAddress::from_hex(&addr.to_hex().to_uppercase()).unwrap(), addr);
    }

    #[test]
    fn test_object_key_is_sharded() {
        let addr = ContentAddress::compute(b"hello world");
        assert_eq!(
            addr.object_key(),
            "content/b9/4d/b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9.bin"
        );
    }

    #[test]
    fn test_serde_uses_text_form() {
        let addr = ContentAddress::compute(b"x");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{addr}\""));
        let back: ContentAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}

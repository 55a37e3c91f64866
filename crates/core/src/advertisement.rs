//! Signed, time-bounded storage advertisements.

use crate::hash::ContentAddress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use time::OffsetDateTime;
use uuid::Uuid;

/// What a provider claims it can do for a piece of content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageCapability {
    pub max_file_size: u64,
    pub supported_mime_types: Vec<String>,
    pub availability_guarantee: f64,
    pub bandwidth_mbps: u64,
    pub cost_per_gb_satoshis: u64,
    pub features: BTreeSet<String>,
}

/// A claim that `storage_provider` can serve `content_hash`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    pub advertisement_id: Uuid,
    pub content_hash: ContentAddress,
    pub storage_provider: String,
    pub capability: StorageCapability,
    pub endpoints: Vec<String>,
    pub geographic_regions: BTreeSet<String>,
    pub ttl_hours: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub active: bool,
    /// Base64 signature over [`Advertisement::signing_payload`].
    pub signature: Option<String>,
}

/// The fields covered by the signature, in a fixed order.
#[derive(Serialize)]
struct SigningPayload<'a> {
    advertisement_id: &'a Uuid,
    content_hash: &'a ContentAddress,
    storage_provider: &'a str,
    capability: &'a StorageCapability,
    endpoints: &'a [String],
    geographic_regions: &'a BTreeSet<String>,
    ttl_hours: u32,
    #[serde(with = "time::serde::rfc3339")]
    published_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    expires_at: OffsetDateTime,
}

impl Advertisement {
    /// Build an unsigned, active advertisement published at `published_at`.
    pub fn new(
        content_hash: ContentAddress,
        storage_provider: impl Into<String>,
        capability: StorageCapability,
        endpoints: Vec<String>,
        geographic_regions: BTreeSet<String>,
        ttl_hours: u32,
        published_at: OffsetDateTime,
    ) -> Self {
        Self {
            advertisement_id: Uuid::new_v4(),
            content_hash,
            storage_provider: storage_provider.into(),
            capability,
            endpoints,
            geographic_regions,
            ttl_hours,
            published_at,
            expires_at: published_at + time::Duration::hours(i64::from(ttl_hours)),
            active: true,
            signature: None,
        }
    }

    /// Canonical bytes handed to the signer.
    pub fn signing_payload(&self) -> crate::Result<Vec<u8>> {
        let payload = SigningPayload {
            advertisement_id: &self.advertisement_id,
            content_hash: &self.content_hash,
            storage_provider: &self.storage_provider,
            capability: &self.capability,
            endpoints: &self.endpoints,
            geographic_regions: &self.geographic_regions,
            ttl_hours: self.ttl_hours,
            published_at: self.published_at,
            expires_at: self.expires_at,
        };
        serde_json::to_vec(&payload).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Active and not yet expired.
    pub fn is_live(&self, now: OffsetDateTime) -> bool {
        self.active && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ttl_hours: u32) -> Advertisement {
        Advertisement::new(
            ContentAddress::compute(b"ad"),
            "provider.example",
            StorageCapability {
                max_file_size: 1024,
                supported_mime_types: vec!["*/*".to_string()],
                availability_guarantee: 0.99,
                bandwidth_mbps: 100,
                cost_per_gb_satoshis: 10,
                features: BTreeSet::new(),
            },
            vec!["https://provider.example/storage/uhrp".to_string()],
            BTreeSet::new(),
            ttl_hours,
            OffsetDateTime::now_utc(),
        )
    }

    #[test]
    fn test_expiry_is_published_plus_ttl() {
        let ad = sample(24);
        assert_eq!(ad.expires_at - ad.published_at, time::Duration::hours(24));
        assert!(ad.is_live(ad.published_at + time::Duration::hours(23)));
        assert!(!ad.is_live(ad.published_at + time::Duration::hours(24)));
    }

    #[test]
    fn test_revoked_is_not_live() {
        let mut ad = sample(24);
        ad.active = false;
        assert!(!ad.is_live(ad.published_at));
    }

    #[test]
    fn test_signing_payload_ignores_signature_and_active() {
        let mut ad = sample(1);
        let before = ad.signing_payload().unwrap();
        ad.signature = Some("sig".to_string());
        ad.active = false;
        assert_eq!(ad.signing_payload().unwrap(), before);
    }
}

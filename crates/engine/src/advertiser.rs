//! Signed storage advertisements for stored content.

use crate::discovery::DiscoverySink;
use crate::error::{EngineError, EngineResult};
use crate::metrics;
use hoard_core::config::AdvertisementConfig;
use hoard_core::{Advertisement, ContentAddress, StorageCapability};
use hoard_metadata::MetadataStore;
use hoard_metadata::models::AdvertisementRow;
use hoard_metadata::repos::{AdvertisementRepo, ContentRepo};
use hoard_signer::Signer;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

pub struct AdvertisementPublisher {
    metadata: Arc<dyn MetadataStore>,
    signer: Option<Arc<dyn Signer>>,
    sink: Arc<dyn DiscoverySink>,
    config: AdvertisementConfig,
}

impl AdvertisementPublisher {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        signer: Option<Arc<dyn Signer>>,
        sink: Arc<dyn DiscoverySink>,
        config: AdvertisementConfig,
    ) -> Self {
        Self {
            metadata,
            signer,
            sink,
            config,
        }
    }

    /// Whether content is advertised automatically after a store.
    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn capability(&self) -> StorageCapability {
        StorageCapability {
            max_file_size: self.config.max_file_size,
            supported_mime_types: self.config.supported_mime_types.clone(),
            availability_guarantee: self.config.availability_guarantee,
            bandwidth_mbps: self.config.bandwidth_mbps,
            cost_per_gb_satoshis: self.config.cost_per_gb_satoshis,
            features: self.config.features.iter().cloned().collect(),
        }
    }

    /// Build, sign, persist and publish an advertisement for `hash`.
    ///
    /// Publication to the discovery sink is best effort: a sink failure is
    /// logged and counted, and the advertisement is still returned.
    #[instrument(skip(self, hash), fields(hash = %hash))]
    pub async fn advertise(&self, hash: &ContentAddress) -> EngineResult<Advertisement> {
        let key = hash.to_string();
        if self.metadata.get_content(&key).await?.is_none() {
            return Err(EngineError::ContentNotFound(key));
        }

        let mut advertisement = Advertisement::new(
            *hash,
            self.config.provider.clone(),
            self.capability(),
            self.config.endpoints(),
            self.config.regions.iter().cloned().collect(),
            self.config.ttl_hours,
            OffsetDateTime::now_utc(),
        );

        let Some(signer) = &self.signer else {
            metrics::record_advertisement("failed");
            return Err(EngineError::AdvertisementFailed(
                "no signing key is configured".to_string(),
            ));
        };
        let payload = advertisement.signing_payload()?;
        let signature = signer.sign(&payload).await.map_err(|e| {
            metrics::record_advertisement("failed");
            EngineError::AdvertisementFailed(format!("signing failed: {e}"))
        })?;
        advertisement.signature = Some(signature);

        self.metadata
            .insert_advertisement(&AdvertisementRow::from_advertisement(&advertisement)?)
            .await?;

        match self.sink.publish(&advertisement).await {
            Ok(()) => metrics::record_advertisement("published"),
            Err(e) => {
                metrics::record_advertisement("publish_failed");
                tracing::warn!(
                    advertisement_id = %advertisement.advertisement_id,
                    sink = self.sink.name(),
                    error = %e,
                    "failed to publish advertisement"
                );
            }
        }

        tracing::info!(
            advertisement_id = %advertisement.advertisement_id,
            key_name = signer.key_name(),
            expires_at = %advertisement.expires_at,
            "content advertised"
        );
        Ok(advertisement)
    }

    /// Withdraw an advertisement. Returns `false` if it was not active.
    #[instrument(skip(self))]
    pub async fn revoke(&self, advertisement_id: Uuid) -> EngineResult<bool> {
        let revoked = self
            .metadata
            .deactivate_advertisement(advertisement_id)
            .await?;
        if revoked {
            if let Err(e) = self.sink.revoke(advertisement_id).await {
                tracing::warn!(sink = self.sink.name(), error = %e, "failed to announce revocation");
            }
            metrics::record_advertisement("revoked");
            tracing::info!("advertisement revoked");
        }
        Ok(revoked)
    }

    /// Active advertisements for `hash` that have not expired.
    pub async fn active_for(&self, hash: &ContentAddress) -> EngineResult<Vec<Advertisement>> {
        self.metadata
            .active_advertisements(&hash.to_string(), OffsetDateTime::now_utc())
            .await?
            .into_iter()
            .map(|row| Advertisement::try_from(row).map_err(EngineError::from))
            .collect()
    }

    /// Deactivate every advertisement past its expiry.
    pub async fn expire_stale(&self) -> EngineResult<u64> {
        let expired = self
            .metadata
            .expire_advertisements(OffsetDateTime::now_utc())
            .await?;
        if expired > 0 {
            tracing::info!(count = expired, "expired stale advertisements");
        }
        Ok(expired)
    }
}

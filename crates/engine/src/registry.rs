//! Where copies of each piece of content live, and how good they are.

use crate::error::{EngineError, EngineResult};
use hoard_core::config::{LocationProfile, LocationsConfig};
use hoard_core::{ContentAddress, LocationKind, LocationRef, StorageLocation};
use hoard_metadata::MetadataStore;
use hoard_metadata::models::LocationRow;
use hoard_metadata::repos::{LocationRepo, RoutingRepo, VerificationRepo};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

/// Registered locations per content address.
///
/// Rows are written once per `(hash, kind)`. Their quality metrics are
/// only ever changed by [`LocationRegistry::refresh_metrics`], which derives
/// them from verification evidence and access logs.
pub struct LocationRegistry {
    metadata: Arc<dyn MetadataStore>,
    locations: LocationsConfig,
    evidence_window: u32,
}

impl LocationRegistry {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        locations: LocationsConfig,
        evidence_window: u32,
    ) -> Self {
        Self {
            metadata,
            locations,
            evidence_window: evidence_window.max(1),
        }
    }

    pub fn profile(&self, kind: LocationKind) -> &LocationProfile {
        self.locations.profile(kind)
    }

    /// The URL a copy of `hash` has at a location of `kind`.
    pub fn url_for(&self, kind: LocationKind, hash: &ContentAddress) -> String {
        self.profile(kind).url_for(&hash.object_key())
    }

    /// Initial view of a location, from its configured profile.
    fn baseline(&self, location: &LocationRef) -> StorageLocation {
        let profile = self.profile(location.kind);
        StorageLocation {
            kind: location.kind,
            url: location.url.clone(),
            availability: profile.availability,
            latency_ms: profile.latency_ms,
            bandwidth_mbps: profile.bandwidth_mbps,
            cost_per_gb_satoshis: profile.cost_per_gb_satoshis,
            geographic_regions: profile.regions.iter().cloned().collect(),
            verified_at: None,
        }
    }

    /// Register a copy. Returns `false` if `(hash, kind)` was already known.
    #[instrument(skip(self), fields(hash = %hash))]
    pub async fn register_location(
        &self,
        hash: &ContentAddress,
        location: &LocationRef,
    ) -> EngineResult<bool> {
        let row = LocationRow::from_location(
            hash,
            &self.baseline(location),
            OffsetDateTime::now_utc(),
        )?;
        let inserted = self.metadata.register_location(&row).await?;
        if inserted {
            tracing::debug!(location = %location.kind, url = %location.url, "location registered");
        }
        Ok(inserted)
    }

    #[instrument(skip(self), fields(hash = %hash))]
    pub async fn remove_location(
        &self,
        hash: &ContentAddress,
        kind: LocationKind,
    ) -> EngineResult<bool> {
        let removed = self
            .metadata
            .remove_location(&hash.to_string(), kind.as_str())
            .await?;
        if removed {
            tracing::info!(location = %kind, "location removed");
        }
        Ok(removed)
    }

    pub async fn locations_for(&self, hash: &ContentAddress) -> EngineResult<Vec<StorageLocation>> {
        let rows = self.metadata.locations_for(&hash.to_string()).await?;
        rows.into_iter()
            .map(|row| StorageLocation::try_from(row).map_err(EngineError::from))
            .collect()
    }

    pub async fn location(
        &self,
        hash: &ContentAddress,
        kind: LocationKind,
    ) -> EngineResult<Option<StorageLocation>> {
        let row = self
            .metadata
            .get_location(&hash.to_string(), kind.as_str())
            .await?;
        Ok(row.map(StorageLocation::try_from).transpose()?)
    }

    /// Recompute availability and latency for every location of `hash`.
    ///
    /// Availability becomes the match ratio over the newest
    /// `evidence_window` verification records; latency becomes the mean
    /// response time of recent uncached reads. Either keeps its current
    /// value while there is no evidence.
    #[instrument(skip(self), fields(hash = %hash))]
    pub async fn refresh_metrics(&self, hash: &ContentAddress) -> EngineResult<()> {
        let key = hash.to_string();
        for row in self.metadata.locations_for(&key).await? {
            let evidence = self
                .metadata
                .recent_verifications(&key, &row.kind, self.evidence_window)
                .await?;

            let availability = if evidence.is_empty() {
                row.availability
            } else {
                let matches = evidence.iter().filter(|v| v.hash_match).count();
                matches as f64 / evidence.len() as f64
            };
            // Evidence is newest first.
            let verified_at = evidence.iter().find(|v| v.hash_match).map(|v| v.verified_at);

            let latency_ms = self
                .metadata
                .mean_response_time(&key, &row.kind, self.evidence_window)
                .await?
                .map(|mean| mean.round() as i64)
                .unwrap_or(row.latency_ms);

            self.metadata
                .update_location_metrics(&key, &row.kind, availability, latency_ms, verified_at)
                .await?;
        }
        Ok(())
    }
}

//! Storage location repository.

use crate::error::MetadataResult;
use crate::models::LocationRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for the `(content_hash, kind)` location rows.
#[async_trait]
pub trait LocationRepo: Send + Sync {
    /// Register a location. Idempotent per `(content_hash, kind)`: an existing
    /// row is left untouched and `false` is returned.
    async fn register_location(&self, row: &LocationRow) -> MetadataResult<bool>;

    /// Remove a location. Returns `true` if a row was deleted.
    async fn remove_location(&self, content_hash: &str, kind: &str) -> MetadataResult<bool>;

    /// All locations registered for a hash, ordered by kind.
    async fn locations_for(&self, content_hash: &str) -> MetadataResult<Vec<LocationRow>>;

    /// Get one location row.
    async fn get_location(
        &self,
        content_hash: &str,
        kind: &str,
    ) -> MetadataResult<Option<LocationRow>>;

    /// Overwrite the derived quality metrics of a location.
    async fn update_location_metrics(
        &self,
        content_hash: &str,
        kind: &str,
        availability: f64,
        latency_ms: i64,
        verified_at: Option<OffsetDateTime>,
    ) -> MetadataResult<()>;
}

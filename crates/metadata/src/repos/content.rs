//! Content record repository.

use crate::error::MetadataResult;
use crate::models::{ContentCoverage, ContentRow};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for content records.
///
/// Records are never deleted; only the tier, local path and counters move.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Insert a record unless one already exists for the hash.
    ///
    /// Returns `true` if the row was created.
    async fn insert_content(&self, row: &ContentRow) -> MetadataResult<bool>;

    /// Get a record by its `sha256:` address.
    async fn get_content(&self, content_hash: &str) -> MetadataResult<Option<ContentRow>>;

    /// Count one re-store of identical bytes.
    async fn record_content_update(
        &self,
        content_hash: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<Option<ContentRow>>;

    /// Count one read and recompute the access frequency.
    async fn record_content_access(
        &self,
        content_hash: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<Option<ContentRow>>;

    /// Set (or clear) the path of the local copy.
    async fn set_local_path(
        &self,
        content_hash: &str,
        local_path: Option<&str>,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Add a verifier to the set of agents and stamp `last_verified_at`.
    async fn add_verification_agent(
        &self,
        content_hash: &str,
        verifier_id: &str,
        verified_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Hashes never verified or last verified before `cutoff`, oldest first.
    async fn content_due_for_verification(
        &self,
        cutoff: OffsetDateTime,
        limit: u32,
    ) -> MetadataResult<Vec<String>>;

    /// Total content and how much of it has at least two locations.
    async fn content_coverage(&self) -> MetadataResult<ContentCoverage>;
}

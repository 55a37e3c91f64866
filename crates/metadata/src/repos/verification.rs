//! Verification evidence repository.

use crate::error::MetadataResult;
use crate::models::VerificationRow;
use async_trait::async_trait;

/// Append-only store of verification records.
#[async_trait]
pub trait VerificationRepo: Send + Sync {
    /// Append one record.
    async fn insert_verification(&self, row: &VerificationRow) -> MetadataResult<()>;

    /// The newest `limit` records for one location of a hash, newest first.
    async fn recent_verifications(
        &self,
        content_hash: &str,
        location: &str,
        limit: u32,
    ) -> MetadataResult<Vec<VerificationRow>>;

    /// The newest `limit` records for a hash across all locations.
    async fn verifications_for(
        &self,
        content_hash: &str,
        limit: u32,
    ) -> MetadataResult<Vec<VerificationRow>>;
}

//! Storage advertisement repository.

use crate::error::MetadataResult;
use crate::models::AdvertisementRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

#[async_trait]
pub trait AdvertisementRepo: Send + Sync {
    async fn insert_advertisement(&self, row: &AdvertisementRow) -> MetadataResult<()>;

    async fn get_advertisement(
        &self,
        advertisement_id: Uuid,
    ) -> MetadataResult<Option<AdvertisementRow>>;

    /// Active advertisements for a hash that expire after `now`.
    async fn active_advertisements(
        &self,
        content_hash: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<Vec<AdvertisementRow>>;

    /// Clear `active`. Returns `false` if the advertisement was already inactive
    /// or does not exist.
    async fn deactivate_advertisement(&self, advertisement_id: Uuid) -> MetadataResult<bool>;

    /// Deactivate every active advertisement whose `expires_at <= now`.
    async fn expire_advertisements(&self, now: OffsetDateTime) -> MetadataResult<u64>;
}

//! The content-addressed write path.

use crate::advertiser::AdvertisementPublisher;
use crate::error::{EngineError, EngineResult};
use crate::metrics;
use crate::registry::LocationRegistry;
use crate::replication::ReplicationCoordinator;
use bytes::Bytes;
use hoard_core::{
    ContentAddress, ContentRecord, DEFAULT_MIME_TYPE, LocationKind, LocationRef, StorageTier,
};
use hoard_metadata::MetadataStore;
use hoard_metadata::models::ContentRow;
use hoard_metadata::repos::{ContentRepo, LocationRepo, ReplicationRepo};
use hoard_storage::{ContentObjects, ObjectStore};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::task::TaskTracker;
use tracing::instrument;

/// Options for [`ContentStore::store`].
#[derive(Clone, Debug, Default)]
pub struct StoreRequest {
    /// Defaults to `application/octet-stream`.
    pub mime_type: Option<String>,
    /// Reject the write unless the bytes hash to this address.
    pub expected_hash: Option<ContentAddress>,
    pub storage_tier: Option<StorageTier>,
    /// Location types to copy to. `None` uses the configured defaults.
    pub replication_targets: Option<Vec<LocationKind>>,
}

impl StoreRequest {
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_expected_hash(mut self, hash: ContentAddress) -> Self {
        self.expected_hash = Some(hash);
        self
    }

    pub fn with_replication_targets(mut self, targets: Vec<LocationKind>) -> Self {
        self.replication_targets = Some(targets);
        self
    }
}

/// Persists bytes under their content address and records them.
pub struct ContentStore {
    local: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    registry: Arc<LocationRegistry>,
    replication: Arc<ReplicationCoordinator>,
    advertiser: Option<Arc<AdvertisementPublisher>>,
    /// Advertisements published in the background after a write.
    advertisements: TaskTracker,
}

impl ContentStore {
    pub fn new(
        local: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        registry: Arc<LocationRegistry>,
        replication: Arc<ReplicationCoordinator>,
        advertiser: Option<Arc<AdvertisementPublisher>>,
    ) -> Self {
        Self {
            local,
            metadata,
            registry,
            replication,
            advertiser,
            advertisements: TaskTracker::new(),
        }
    }

    /// Store `data` and return its record.
    ///
    /// Storing the same bytes again is a no-op on disk and counts as an
    /// update on the record.
    #[instrument(skip(self, data, request), fields(size = data.len()))]
    pub async fn store(&self, data: Bytes, request: StoreRequest) -> EngineResult<ContentRecord> {
        let hash = ContentAddress::compute(&data);
        if let Some(expected) = request.expected_hash
            && expected != hash
        {
            return Err(EngineError::HashMismatch {
                expected: expected.to_string(),
                actual: hash.to_string(),
            });
        }

        let replication = self.replication.config();
        let targets = request
            .replication_targets
            .unwrap_or_else(|| replication.default_targets.clone());
        if targets.contains(&LocationKind::Local) {
            return Err(EngineError::InvalidReplicationTarget(
                "content is always stored locally".to_string(),
            ));
        }

        let object_key = hash.object_key();
        let size = data.len() as u64;
        let written = self.local.put_content(&hash, data).await?;

        let key = hash.to_string();
        let now = OffsetDateTime::now_utc();
        let mut record = ContentRecord::new(
            hash,
            size,
            request
                .mime_type
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            request.storage_tier.unwrap_or_default(),
        );
        record.local_path = Some(object_key.clone());

        let inserted = self
            .metadata
            .insert_content(&ContentRow::from_record(&record)?)
            .await?;
        if !inserted {
            self.metadata.record_content_update(&key, now).await?;
            self.metadata
                .set_local_path(&key, Some(&object_key), now)
                .await?;
        }

        let local = LocationRef::new(
            LocationKind::Local,
            self.registry.url_for(LocationKind::Local, &hash),
        );
        self.registry.register_location(&hash, &local).await?;

        metrics::CONTENT_STORED.inc();
        if written {
            metrics::BYTES_STORED.inc_by(size);
        }
        tracing::info!(hash = %hash, size, new_object = written, new_record = inserted, "content stored");

        let priority = replication.default_priority;
        for target in targets {
            self.replication
                .schedule_if_missing(&hash, LocationKind::Local, target, priority)
                .await?;
        }

        if let Some(publisher) = &self.advertiser
            && publisher.enabled()
        {
            let publisher = Arc::clone(publisher);
            self.advertisements.spawn(async move {
                if let Err(e) = publisher.advertise(&hash).await {
                    tracing::warn!(hash = %hash, error = %e, "failed to advertise stored content");
                }
            });
        }

        self.record(&hash)
            .await?
            .ok_or(EngineError::ContentNotFound(key))
    }

    /// Wait until every advertisement started by an earlier write is done.
    pub async fn flush_advertisements(&self) {
        self.advertisements.close();
        self.advertisements.wait().await;
        self.advertisements.reopen();
    }

    /// Read the local copy of `hash`. A copy that no longer matches its
    /// address is reported as a hash mismatch.
    pub async fn read_local(&self, hash: &ContentAddress) -> EngineResult<Bytes> {
        match self.local.get_content(hash).await {
            Ok(data) => Ok(data),
            Err(e) if e.is_not_found() => Err(EngineError::ContentNotFound(hash.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn health_check(&self) -> EngineResult<()> {
        self.local.health_check().await?;
        Ok(())
    }

    pub async fn contains(&self, hash: &ContentAddress) -> EngineResult<bool> {
        Ok(self.metadata.get_content(&hash.to_string()).await?.is_some())
    }

    /// The full record of `hash`, with its locations and replication state.
    pub async fn record(&self, hash: &ContentAddress) -> EngineResult<Option<ContentRecord>> {
        let key = hash.to_string();
        let Some(row) = self.metadata.get_content(&key).await? else {
            return Ok(None);
        };
        let locations = self.metadata.locations_for(&key).await?;
        let statuses = self.metadata.replication_statuses(&key).await?;
        Ok(Some(row.into_record(&locations, &statuses)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ObjectStoreTransport;
    use hoard_core::JobStatus;
    use hoard_core::config::{LocationsConfig, ReplicationConfig};
    use hoard_metadata::SqliteStore;
    use hoard_storage::FilesystemBackend;
    use tokio_util::sync::CancellationToken;

    async fn content_store(dir: &std::path::Path) -> (ContentStore, Arc<FilesystemBackend>) {
        let metadata = Arc::new(SqliteStore::new(dir.join("m.db"), None).await.unwrap());
        let local = Arc::new(FilesystemBackend::new(dir.join("local")).await.unwrap());
        let transport = ObjectStoreTransport::new(LocationsConfig::default())
            .with_store(LocationKind::Local, local.clone());
        let registry = Arc::new(LocationRegistry::new(
            metadata.clone(),
            LocationsConfig::default(),
            20,
        ));
        let replication = Arc::new(ReplicationCoordinator::new(
            metadata.clone(),
            Arc::new(transport),
            registry.clone(),
            ReplicationConfig::default(),
            CancellationToken::new(),
        ));
        let store = ContentStore::new(local.clone(), metadata, registry, replication, None);
        (store, local)
    }

    #[tokio::test]
    async fn store_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let (store, local) = content_store(temp.path()).await;
        let data = Bytes::from_static(b"same bytes");

        let first = store.store(data.clone(), StoreRequest::default()).await.unwrap();
        let second = store.store(data.clone(), StoreRequest::default()).await.unwrap();

        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(second.access_statistics.update_count, 1);
        assert_eq!(second.mime_type, DEFAULT_MIME_TYPE);
        assert_eq!(second.size_bytes, data.len() as u64);
        assert_eq!(
            second
                .locations
                .iter()
                .filter(|l| l.kind == LocationKind::Local)
                .count(),
            1
        );
        assert_eq!(local.list("content").await.unwrap().len(), 1);
        assert_eq!(store.read_local(&first.content_hash).await.unwrap(), data);
    }

    #[tokio::test]
    async fn store_enqueues_default_targets_once() {
        let temp = tempfile::tempdir().unwrap();
        let (store, _local) = content_store(temp.path()).await;
        let data = Bytes::from_static(b"replicated");

        let record = store.store(data.clone(), StoreRequest::default()).await.unwrap();
        store.store(data, StoreRequest::default()).await.unwrap();

        assert_eq!(record.replication_status.len(), 2);
        assert_eq!(
            record.replication_status.get(&LocationKind::Cdn),
            Some(&JobStatus::Pending)
        );
        let jobs = store.replication.jobs_for(&record.content_hash).await.unwrap();
        assert_eq!(jobs.len(), 2);
    }

    #[tokio::test]
    async fn expected_hash_mismatch_writes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let (store, local) = content_store(temp.path()).await;
        let wrong = ContentAddress::compute(b"other");

        let err = store
            .store(
                Bytes::from_static(b"payload"),
                StoreRequest::default().with_expected_hash(wrong),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::HashMismatch { .. }));
        assert!(local.list("content").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_is_not_a_replication_target() {
        let temp = tempfile::tempdir().unwrap();
        let (store, _local) = content_store(temp.path()).await;
        let err = store
            .store(
                Bytes::from_static(b"payload"),
                StoreRequest::default().with_replication_targets(vec![LocationKind::Local]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidReplicationTarget(_)));
    }

    #[tokio::test]
    async fn unknown_content_has_no_record() {
        let temp = tempfile::tempdir().unwrap();
        let (store, _local) = content_store(temp.path()).await;
        let hash = ContentAddress::compute(b"absent");
        assert!(!store.contains(&hash).await.unwrap());
        assert!(store.record(&hash).await.unwrap().is_none());
        assert!(matches!(
            store.read_local(&hash).await.unwrap_err(),
            EngineError::ContentNotFound(_)
        ));
    }
}

use hoard_core::{ContentAddress, ContentRecord, LocationKind, ReplicationJob, StorageTier};
use hoard_metadata::SqliteStore;
use hoard_metadata::models::{ContentRow, ReplicationJobRow};
use hoard_metadata::repos::{ContentRepo, ReplicationRepo};
use tempfile::TempDir;

/// A store in a fresh temporary directory. Keep the `TempDir` alive.
pub async fn open_store() -> (SqliteStore, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("metadata.db"), Some(5))
        .await
        .unwrap();
    (store, dir)
}

/// Insert a content record for `data` and return its address.
pub async fn seed_content(store: &SqliteStore, data: &[u8]) -> ContentAddress {
    let hash = ContentAddress::compute(data);
    let record = ContentRecord::new(hash, data.len() as u64, "text/plain", StorageTier::Hot);
    store
        .insert_content(&ContentRow::from_record(&record).unwrap())
        .await
        .unwrap();
    hash
}

/// Insert a pending job and return it.
#[allow(dead_code)]
pub async fn seed_job(
    store: &SqliteStore,
    hash: ContentAddress,
    target: LocationKind,
    priority: u8,
) -> ReplicationJob {
    let job = ReplicationJob::new(hash, LocationKind::Local, target, priority, 3);
    store
        .create_job(&ReplicationJobRow::from(&job))
        .await
        .unwrap();
    job
}

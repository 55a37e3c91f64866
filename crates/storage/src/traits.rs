//! The byte-store interface and its content-addressed helpers.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use hoard_core::ContentAddress;

/// Size and age of a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    pub size: u64,
    pub last_modified: Option<time::OffsetDateTime>,
}

/// A flat key/value byte store.
///
/// Keys are relative, `/`-separated paths. `put` must be atomic: readers
/// see either the old object or the complete new one.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta>;

    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Write `data` under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Write `data` unless `key` already exists. Returns whether it wrote.
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Keys under `prefix`, relative to the store root, sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    fn backend_name(&self) -> &'static str;

    async fn health_check(&self) -> StorageResult<()> {
        self.exists(".hoard-health-check").await.map(|_| ())
    }
}

fn check_digest(hash: &ContentAddress, data: &[u8]) -> StorageResult<()> {
    let actual = ContentAddress::compute(data);
    if actual == *hash {
        return Ok(());
    }
    Err(StorageError::DigestMismatch {
        key: hash.object_key(),
        expected: hash.to_string(),
        actual: actual.to_string(),
    })
}

/// Content-addressed access on top of any [`ObjectStore`].
///
/// Objects live under [`ContentAddress::object_key`] and are checked
/// against their address on the way in and on the way out.
#[async_trait]
pub trait ContentObjects: ObjectStore {
    /// Store `data` as the object for `hash`. Returns whether it wrote.
    async fn put_content(&self, hash: &ContentAddress, data: Bytes) -> StorageResult<bool> {
        check_digest(hash, &data)?;
        self.put_if_not_exists(&hash.object_key(), data).await
    }

    /// Read the object for `hash`, failing with `DigestMismatch` if it rotted.
    async fn get_content(&self, hash: &ContentAddress) -> StorageResult<Bytes> {
        let data = self.get(&hash.object_key()).await?;
        check_digest(hash, &data)?;
        Ok(data)
    }

    async fn contains_content(&self, hash: &ContentAddress) -> StorageResult<bool> {
        self.exists(&hash.object_key()).await
    }
}

impl<T: ObjectStore + ?Sized> ContentObjects for T {}

//! Objects as files under a root directory.
//!
//! Writes go to `.staging/` first and are moved into place, so a crash never
//! leaves a partial object under its final key. Create-if-absent links the
//! staged file into place, which fails if the key already exists.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ObjectMeta, ObjectStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

const STAGING_DIR: &str = ".staging";

#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
}

/// Map `NotFound` to the storage-level error for `key`.
fn io_error(key: &str, e: std::io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
        _ => StorageError::Io(e),
    }
}

/// Reject keys that are empty, absolute, or step outside the root.
fn validate_key(key: &str) -> StorageResult<()> {
    let normal = !key.is_empty()
        && !key.contains('\\')
        && Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !normal {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    if key == STAGING_DIR || key.starts_with(".staging/") {
        return Err(StorageError::InvalidKey(format!("reserved prefix: {key}")));
    }
    Ok(())
}

/// Fail if any existing component of `key` below `root` is a symlink.
fn reject_symlinks(root: &Path, key: &str) -> StorageResult<()> {
    let mut path = root.to_path_buf();
    for component in Path::new(key).components() {
        path.push(component);
        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(StorageError::InvalidKey(format!("symlink in key: {key}")));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::Io(e)),
        }
    }
    Ok(())
}

impl FilesystemBackend {
    /// Open the store at `root`, creating it if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(STAGING_DIR)).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the object for `key` lives on disk. Runs the symlink check on the
    /// blocking pool.
    async fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        let root = self.root.clone();
        let owned = key.to_string();
        tokio::task::spawn_blocking(move || reject_symlinks(&root, &owned))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;
        Ok(self.root.join(key))
    }

    /// Write `data` to a fresh file under `.staging/` and flush it.
    async fn stage(&self, data: &[u8]) -> StorageResult<PathBuf> {
        let staged = self
            .root
            .join(STAGING_DIR)
            .join(Uuid::new_v4().simple().to_string());
        let mut file = fs::File::create(&staged).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok(staged)
    }

    async fn prepare_parent(&self, path: &Path) -> StorageResult<()> {
        match path.parent() {
            Some(parent) => Ok(fs::create_dir_all(parent).await?),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve(key).await?;
        Ok(fs::try_exists(&path).await?)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.resolve(key).await?;
        let meta = fs::metadata(&path).await.map_err(|e| io_error(key, e))?;
        Ok(ObjectMeta {
            size: meta.len(),
            last_modified: meta.modified().ok().map(Into::into),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.resolve(key).await?;
        fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| io_error(key, e))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.resolve(key).await?;
        self.prepare_parent(&path).await?;
        let staged = self.stage(&data).await?;
        if let Err(e) = fs::rename(&staged, &path).await {
            let _ = fs::remove_file(&staged).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        let path = self.resolve(key).await?;
        if fs::try_exists(&path).await? {
            return Ok(false);
        }
        self.prepare_parent(&path).await?;

        let staged = self.stage(&data).await?;
        let linked = fs::hard_link(&staged, &path).await;
        let _ = fs::remove_file(&staged).await;
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve(key).await?;
        fs::remove_file(&path).await.map_err(|e| io_error(key, e))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let start = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.resolve(prefix).await?
        };
        let mut keys = Vec::new();
        if !fs::try_exists(&start).await? {
            return Ok(keys);
        }

        let staging = self.root.join(STAGING_DIR);
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let kind = entry.file_type().await?;
                if kind.is_dir() && path != staging {
                    pending.push(path);
                } else if kind.is_file()
                    && let Ok(relative) = path.strip_prefix(&self.root)
                {
                    keys.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::NotADirectory,
                format!("{} is not a directory", self.root.display()),
            )));
        }
        // Puts need the staging directory.
        fs::metadata(self.root.join(STAGING_DIR)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ContentObjects;
    use hoard_core::ContentAddress;

    async fn backend() -> (FilesystemBackend, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (FilesystemBackend::new(dir.path()).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn test_object_lands_under_its_key() {
        let (store, dir) = backend().await;
        let data = Bytes::from_static(b"hello world");

        store.put("content/ab/cd/object.bin", data.clone()).await.unwrap();

        assert_eq!(
            std::fs::read(dir.path().join("content/ab/cd/object.bin")).unwrap(),
            b"hello world"
        );
        assert_eq!(store.get("content/ab/cd/object.bin").await.unwrap(), data);
        assert_eq!(store.head("content/ab/cd/object.bin").await.unwrap().size, 11);
    }

    #[tokio::test]
    async fn test_create_if_absent_keeps_first_write() {
        let (store, _dir) = backend().await;
        assert!(store.put_if_not_exists("k", Bytes::from("first")).await.unwrap());
        assert!(!store.put_if_not_exists("k", Bytes::from("second")).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Bytes::from("first"));
        // Overwrite is still possible through put.
        store.put("k", Bytes::from("third")).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Bytes::from("third"));
    }

    #[tokio::test]
    async fn test_staging_is_left_empty() {
        let (store, dir) = backend().await;
        store.put("a", Bytes::from("1")).await.unwrap();
        store.put_if_not_exists("b", Bytes::from("2")).await.unwrap();
        store.put_if_not_exists("b", Bytes::from("2")).await.unwrap();

        let staged = std::fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count();
        assert_eq!(staged, 0);
        assert_eq!(store.list("").await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let (store, _dir) = backend().await;
        assert!(store.get("nope").await.unwrap_err().is_not_found());
        assert!(store.head("nope").await.unwrap_err().is_not_found());
        assert!(store.delete("nope").await.unwrap_err().is_not_found());
        assert!(!store.exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_unsafe_keys_rejected() {
        let (store, _dir) = backend().await;
        for key in ["", "../escape", "/absolute", "a/../b", ".staging/x", "a\\b"] {
            assert!(
                matches!(store.exists(key).await, Err(StorageError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
        assert!(store.exists("valid/nested/key").await.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlinked_directory_rejected() {
        use std::os::unix::fs::symlink;

        let (store, dir) = backend().await;
        let outside = tempfile::tempdir().unwrap();
        symlink(outside.path(), dir.path().join("link")).unwrap();

        let err = store.put("link/file", Bytes::from("x")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert_eq!(std::fs::read_dir(outside.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_content_helpers_check_the_digest() {
        let (store, _dir) = backend().await;
        let data = Bytes::from_static(b"addressed");
        let hash = ContentAddress::compute(&data);

        assert!(store.put_content(&hash, data.clone()).await.unwrap());
        assert!(store.contains_content(&hash).await.unwrap());
        assert_eq!(store.get_content(&hash).await.unwrap(), data);

        let other = ContentAddress::compute(b"something else");
        assert!(matches!(
            store.put_content(&other, data.clone()).await,
            Err(StorageError::DigestMismatch { .. })
        ));

        // Corrupt the stored object in place.
        store.put(&hash.object_key(), Bytes::from("rotten")).await.unwrap();
        assert!(matches!(
            store.get_content(&hash).await,
            Err(StorageError::DigestMismatch { .. })
        ));
    }
}

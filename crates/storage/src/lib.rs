//! Byte stores for hoard.
//!
//! One [`ObjectStore`] trait fronts the local content store, the stores behind
//! remote locations and the disk cache tiers. [`ContentObjects`] layers
//! digest checks on top for keys derived from a [`hoard_core::ContentAddress`].

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use backends::s3::{S3Backend, S3Settings};
pub use error::{StorageError, StorageResult};
pub use traits::{ContentObjects, ObjectMeta, ObjectStore};

use hoard_core::config::StorageConfig;
use std::sync::Arc;

impl S3Settings {
    /// Settings for an S3 store config; `None` for any other backend.
    pub fn from_config(config: &StorageConfig) -> Option<Self> {
        match config {
            StorageConfig::S3 {
                bucket,
                endpoint,
                region,
                prefix,
                access_key_id,
                secret_access_key,
                force_path_style,
            } => Some(S3Settings {
                bucket: bucket.clone(),
                endpoint: endpoint.clone(),
                region: region.clone(),
                prefix: prefix.clone(),
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                force_path_style: *force_path_style,
            }),
            StorageConfig::Filesystem { .. } => None,
        }
    }
}

/// Open the store described by `config`.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    let store: Arc<dyn ObjectStore> = match config {
        StorageConfig::Filesystem { path } => Arc::new(FilesystemBackend::new(path).await?),
        StorageConfig::S3 { .. } => {
            let settings = S3Settings::from_config(config)
                .ok_or_else(|| StorageError::Config("expected s3 settings".to_string()))?;
            Arc::new(S3Backend::new(settings).await?)
        }
    };
    tracing::debug!(backend = store.backend_name(), "object store opened");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hoard_core::ContentAddress;

    #[tokio::test]
    async fn test_filesystem_store_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = from_config(&StorageConfig::Filesystem {
            path: dir.path().join("nested/store"),
        })
        .await
        .unwrap();

        let data = Bytes::from_static(b"opened");
        let hash = ContentAddress::compute(&data);
        assert!(store.put_content(&hash, data).await.unwrap());
        assert!(dir.path().join("nested/store").join(hash.object_key()).is_file());
        assert_eq!(store.backend_name(), "filesystem");
    }

    #[tokio::test]
    async fn test_s3_config_is_validated_before_connecting() {
        let config = StorageConfig::S3 {
            bucket: String::new(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        };
        assert!(matches!(
            from_config(&config).await,
            Err(StorageError::Config(msg)) if msg.contains("bucket")
        ));
    }

    #[test]
    fn test_s3_settings_from_config() {
        let config = StorageConfig::S3 {
            bucket: "content".to_string(),
            endpoint: Some("minio:9000".to_string()),
            region: None,
            prefix: Some("cdn".to_string()),
            access_key_id: None,
            secret_access_key: None,
            force_path_style: true,
        };
        let settings = S3Settings::from_config(&config).unwrap();
        assert_eq!(settings.bucket, "content");
        assert_eq!(settings.prefix.as_deref(), Some("cdn"));
        assert!(settings.force_path_style);

        let fs = StorageConfig::Filesystem { path: "x".into() };
        assert!(S3Settings::from_config(&fs).is_none());
    }
}

//! Objects in an S3-compatible bucket.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ObjectMeta, ObjectStore};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use bytes::Bytes;
use std::time::Duration;
use tracing::instrument;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`S3Backend`].
#[derive(Clone, Debug, Default)]
pub struct S3Settings {
    pub bucket: String,
    /// Custom endpoint for S3-compatible services. Bare `host:port` means http.
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Prepended to every key, without a trailing slash.
    pub prefix: Option<String>,
    /// Static credentials. Both or neither; neither uses the ambient chain.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub force_path_style: bool,
}

pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl std::fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

fn http_status<E>(err: &SdkError<E>) -> Option<u16> {
    match err {
        SdkError::ServiceError(service) => Some(service.raw().status().as_u16()),
        _ => None,
    }
}

fn map_sdk_error<E>(key: &str, err: SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match http_status(&err) {
        Some(404) => StorageError::NotFound(key.to_string()),
        _ => StorageError::remote(err),
    }
}

fn normalize_endpoint(endpoint: String) -> String {
    let lower = endpoint.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        endpoint
    } else {
        format!("http://{endpoint}")
    }
}

impl S3Backend {
    pub async fn new(settings: S3Settings) -> StorageResult<Self> {
        let region = aws_config::Region::new(
            settings
                .region
                .unwrap_or_else(|| "us-east-1".to_string()),
        );
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        match (settings.access_key_id, settings.secret_access_key) {
            (Some(id), Some(secret)) => {
                loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                    id, secret, None, None, "hoard",
                ));
            }
            (None, None) => {}
            _ => {
                return Err(StorageError::Config(
                    "s3 access_key_id and secret_access_key must be set together".to_string(),
                ));
            }
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(settings.force_path_style);
        if let Some(endpoint) = settings.endpoint {
            builder = builder.endpoint_url(normalize_endpoint(endpoint));
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket,
            prefix: settings
                .prefix
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
        })
    }

    fn object_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }

    fn relative_key<'a>(&self, object_key: &'a str) -> &'a str {
        self.prefix
            .as_deref()
            .and_then(|prefix| object_key.strip_prefix(prefix))
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(object_key)
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;

        Ok(ObjectMeta {
            size: u64::try_from(output.content_length().unwrap_or(0)).unwrap_or(0),
            last_modified: output
                .last_modified()
                .and_then(|at| time::OffsetDateTime::from_unix_timestamp(at.secs()).ok()),
        })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;
        let body = output.body.collect().await.map_err(StorageError::remote)?;
        Ok(body.into_bytes())
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .body(data.into())
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;
        Ok(())
    }

    /// Conditional write with `If-None-Match: *`. Services that ignore the
    /// header overwrite, which is harmless for content-addressed keys.
    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .if_none_match("*")
            .body(data.into())
            .send()
            .await;
        match result {
            Ok(_) => Ok(true),
            // 412: the object exists. 409: a concurrent conditional write won.
            Err(e) if matches!(http_status(&e), Some(412 | 409)) => Ok(false),
            Err(e) => Err(map_sdk_error(key, e)),
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        // DeleteObject succeeds on missing keys.
        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| map_sdk_error(key, e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(self.object_key(prefix))
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(StorageError::remote)?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(|key| self.relative_key(key).to_string()),
            );
        }
        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        let probe = self.client.head_bucket().bucket(&self.bucket).send();
        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, probe).await {
            Ok(result) => result.map(|_| ()).map_err(StorageError::remote),
            Err(_) => Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("bucket {} did not answer within {HEALTH_CHECK_TIMEOUT:?}", self.bucket),
            ))),
        }
    }
}

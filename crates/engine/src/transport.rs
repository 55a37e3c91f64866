//! Moving bytes to and from storage locations.

use async_trait::async_trait;
use bytes::Bytes;
use hoard_core::config::{LocationProfile, LocationsConfig};
use hoard_core::{ContentAddress, LocationKind, LocationRef};
use hoard_storage::{ObjectStore, StorageError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// A failed transfer to or from a location.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The location could not be reached at all.
    #[error("{kind} is unreachable: {message}")]
    Unreachable { kind: LocationKind, message: String },

    /// The location answered but does not hold the object.
    #[error("object not found at {0}")]
    NotFound(String),

    /// The location answered with an error.
    #[error("remote error: {0}")]
    Remote(String),
}

impl TransportError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Access to the bytes held at each location kind.
#[async_trait]
pub trait LocationTransport: Send + Sync + 'static {
    /// Fetch the full object for `hash` from `location`.
    async fn fetch(&self, location: &LocationRef, hash: &ContentAddress) -> TransportResult<Bytes>;

    /// Write `data` to a location of `kind` and return where it landed.
    async fn put(
        &self,
        kind: LocationKind,
        hash: &ContentAddress,
        data: Bytes,
    ) -> TransportResult<LocationRef>;

    /// Whether `location` still holds the object.
    async fn exists(&self, location: &LocationRef, hash: &ContentAddress) -> TransportResult<bool> {
        match self.fetch(location, hash).await {
            Ok(_) => Ok(true),
            Err(TransportError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Digest of the object as reported by `location`.
    ///
    /// Transports without a server-side digest hash the fetched bytes.
    async fn digest(
        &self,
        location: &LocationRef,
        hash: &ContentAddress,
    ) -> TransportResult<ContentAddress> {
        let data = self.fetch(location, hash).await?;
        Ok(ContentAddress::compute(&data))
    }
}

/// A transport that maps every location kind onto an [`ObjectStore`].
///
/// Kinds without a configured store are reported as unreachable.
pub struct ObjectStoreTransport {
    stores: HashMap<LocationKind, Arc<dyn ObjectStore>>,
    locations: LocationsConfig,
}

impl ObjectStoreTransport {
    pub fn new(locations: LocationsConfig) -> Self {
        Self {
            stores: HashMap::new(),
            locations,
        }
    }

    /// Attach the store backing `kind`.
    pub fn with_store(mut self, kind: LocationKind, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.insert(kind, store);
        self
    }

    /// Build the transport from the per-kind location profiles.
    ///
    /// `local` is the content store itself; every other kind uses the store
    /// configured on its profile, if any.
    pub async fn from_config(
        locations: &LocationsConfig,
        local: Arc<dyn ObjectStore>,
    ) -> hoard_storage::StorageResult<Self> {
        let mut transport = Self::new(locations.clone()).with_store(LocationKind::Local, local);
        for kind in LocationKind::ALL {
            if kind == LocationKind::Local {
                continue;
            }
            if let Some(storage) = &locations.profile(kind).storage {
                let store = hoard_storage::from_config(storage).await?;
                tracing::debug!(location = %kind, backend = store.backend_name(), "attached location store");
                transport = transport.with_store(kind, store);
            }
        }
        Ok(transport)
    }

    fn store(&self, kind: LocationKind) -> TransportResult<&Arc<dyn ObjectStore>> {
        self.stores
            .get(&kind)
            .ok_or_else(|| TransportError::Unreachable {
                kind,
                message: "no store configured".to_string(),
            })
    }

    fn profile(&self, kind: LocationKind) -> &LocationProfile {
        self.locations.profile(kind)
    }
}

fn map_storage_error(kind: LocationKind, key: &str, e: StorageError) -> TransportError {
    match e {
        StorageError::NotFound(_) => TransportError::NotFound(key.to_string()),
        StorageError::Remote(inner) => TransportError::Unreachable {
            kind,
            message: inner.to_string(),
        },
        other => TransportError::Remote(other.to_string()),
    }
}

#[async_trait]
impl LocationTransport for ObjectStoreTransport {
    #[instrument(skip(self), fields(location = %location.kind))]
    async fn fetch(&self, location: &LocationRef, hash: &ContentAddress) -> TransportResult<Bytes> {
        let key = hash.object_key();
        self.store(location.kind)?
            .get(&key)
            .await
            .map_err(|e| map_storage_error(location.kind, &key, e))
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put(
        &self,
        kind: LocationKind,
        hash: &ContentAddress,
        data: Bytes,
    ) -> TransportResult<LocationRef> {
        let key = hash.object_key();
        self.store(kind)?
            .put(&key, data)
            .await
            .map_err(|e| map_storage_error(kind, &key, e))?;
        Ok(LocationRef::new(kind, self.profile(kind).url_for(&key)))
    }

    async fn exists(&self, location: &LocationRef, hash: &ContentAddress) -> TransportResult<bool> {
        let key = hash.object_key();
        self.store(location.kind)?
            .exists(&key)
            .await
            .map_err(|e| map_storage_error(location.kind, &key, e))
    }
}

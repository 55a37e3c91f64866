//! Persistent records for hoard.
//!
//! Content rows, the locations that hold each object, replication jobs,
//! verification evidence, advertisements and routing history all live in one
//! SQLite database. Access goes through the per-table repo traits collected
//! by [`MetadataStore`].

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use hoard_core::config::MetadataConfig;
use std::sync::Arc;

/// Open the metadata store described by `config`, migrated and ready.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    let MetadataConfig::Sqlite {
        path,
        query_timeout_secs,
    } = config;
    let store: Arc<dyn MetadataStore> = Arc::new(SqliteStore::new(path, *query_timeout_secs).await?);
    Ok(store)
}

//! Configuration loading and engine assembly.

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use hoard_core::config::AppConfig;
use hoard_engine::{Engine, EngineContext, ObjectStoreTransport};
use hoard_signer::Signer;
use std::path::Path;
use std::sync::Arc;

/// Load the configuration: defaults, then the TOML file if it exists, then
/// `HOARD_` environment variables (`__` separates nested keys).
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if path.exists() {
        tracing::info!(config_path = %path.display(), "loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!(config_path = %path.display(), "no config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("HOARD_").ignore(&["CONFIG"]).split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

/// Build the engine and its collaborators from `config`.
pub async fn build_engine(config: AppConfig) -> Result<Engine> {
    let local = hoard_storage::from_config(&config.storage)
        .await
        .context("failed to initialize content store")?;
    local
        .health_check()
        .await
        .context("content store health check failed")?;
    tracing::info!(backend = local.backend_name(), "content store initialized");

    let metadata = hoard_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("metadata store initialized");

    let transport = ObjectStoreTransport::from_config(&config.locations, Arc::clone(&local))
        .await
        .context("failed to initialize location stores")?;

    let signer: Option<Arc<dyn Signer>> = match &config.signing {
        Some(signing) => {
            let signer =
                hoard_signer::from_config(signing).context("failed to load signing key")?;
            tracing::info!(key_name = signer.key_name(), "signing key loaded");
            Some(Arc::new(signer))
        }
        None => {
            tracing::warn!("no signing key configured, advertisements will fail");
            None
        }
    };

    let discovery = hoard_engine::discovery::from_config(&config.advertisement.sink)
        .context("failed to initialize discovery sink")?;

    Engine::new(EngineContext {
        config,
        metadata,
        local,
        transport: Arc::new(transport),
        signer,
        discovery,
    })
    .await
    .context("failed to build engine")
}

pub mod mocks;

#[allow(unused_imports)]
pub use mocks::{Fault, FaultyTransport};

use hoard_core::config::AppConfig;
use hoard_engine::{Engine, EngineContext, NullSink, ObjectStoreTransport};
use std::sync::Arc;
use tempfile::TempDir;

/// An engine over a temporary directory with filesystem-backed locations.
#[allow(dead_code)]
pub struct TestEngine {
    pub engine: Engine,
    pub transport: Arc<FaultyTransport>,
    pub config: AppConfig,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestEngine {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::for_testing(temp_dir.path());
        config.replication.backoff_base_ms = 0;
        adjust(&mut config);

        let metadata = hoard_metadata::from_config(&config.metadata).await.unwrap();
        let local = hoard_storage::from_config(&config.storage).await.unwrap();
        let inner = ObjectStoreTransport::from_config(&config.locations, local.clone())
            .await
            .unwrap();
        let transport = Arc::new(FaultyTransport::new(inner));
        let signer = hoard_signer::from_config(config.signing.as_ref().unwrap()).unwrap();

        let engine = Engine::new(EngineContext {
            config: config.clone(),
            metadata,
            local,
            transport: transport.clone(),
            signer: Some(Arc::new(signer)),
            discovery: Arc::new(NullSink),
        })
        .await
        .unwrap();

        Self {
            engine,
            transport,
            config,
            _temp_dir: temp_dir,
        }
    }
}

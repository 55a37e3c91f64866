//! Server test utilities.

use hoard_core::config::AppConfig;
use hoard_server::{AppState, build_engine, create_router};
use std::sync::Arc;
use tempfile::TempDir;

/// A router over an engine in a temporary directory.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::for_testing(temp_dir.path());
        adjust(&mut config);

        let engine = build_engine(config).await.unwrap();
        let state = AppState::new(Arc::new(engine));
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }
}

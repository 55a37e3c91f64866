//! Shared handler state.

use hoard_engine::Engine;
use std::sync::Arc;

/// State shared by the operational endpoint handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

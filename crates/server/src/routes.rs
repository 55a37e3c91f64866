//! Route configuration.

use crate::error::ApiResult;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health. Fails with 503 when the metadata or content store is down.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.engine.health_check().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Create the operational router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new().route("/health", get(health_check));
    if state.engine.config().server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }
    router.layer(TraceLayer::new_for_http()).with_state(state)
}

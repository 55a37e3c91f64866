//! Prometheus scrape endpoint.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

const EXPOSITION_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /metrics
pub async fn metrics_handler() -> Response {
    match hoard_engine::metrics::encode_text() {
        Ok(body) => ([(header::CONTENT_TYPE, EXPOSITION_FORMAT)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hoard_engine::EngineError;
use serde::Serialize;

/// Error body returned to callers.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable error code.
    pub code: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Engine(e) => match e {
                EngineError::IoFailure(_) => "io_failure",
                EngineError::HashMismatch { .. } => "hash_mismatch",
                EngineError::InvalidReplicationTarget(_) => "invalid_replication_target",
                EngineError::NoLocationsAvailable(_) => "no_locations_available",
                EngineError::ContentNotFound(_) => "content_not_found",
                EngineError::JobNotFound(_) => "job_not_found",
                EngineError::AdvertisementFailed(_) => "advertisement_failed",
                EngineError::Invalid(_) => "invalid_request",
                EngineError::Metadata(_) => "metadata_error",
                EngineError::Config(_) => "config_error",
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Engine(e) => match e {
                EngineError::ContentNotFound(_) | EngineError::JobNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                EngineError::HashMismatch { .. }
                | EngineError::InvalidReplicationTarget(_)
                | EngineError::Invalid(_) => StatusCode::BAD_REQUEST,
                EngineError::NoLocationsAvailable(_)
                | EngineError::IoFailure(_)
                | EngineError::Metadata(_) => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::AdvertisementFailed(_) | EngineError::Config(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

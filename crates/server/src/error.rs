//! Server-local error type: translates collaborator/store failures into
//! HTTP responses (spec §6), one variant per status code, axum-idiom style.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("upstream provider not configured")]
    UpstreamNotConfigured,

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("vehicle not found")]
    VehicleNotFound,

    #[error(transparent)]
    Core(#[from] drivelog::DrivelogError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::UpstreamNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServerError::VehicleNotFound => StatusCode::NOT_FOUND,
            ServerError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

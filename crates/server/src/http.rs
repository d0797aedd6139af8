//! Axum HTTP transport (spec §6): a webhook ingestion endpoint and a
//! handful of operator commands. The teacher's own HTTP transport
//! (`transport/http.rs`) was never finished beyond a placeholder — this
//! module is the real thing, in the same request/response idiom.

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use drivelog::parser;
use drivelog_types::EventSource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, warn};
use uuid::Uuid;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook/:user_id", post(webhook))
        .route("/operator/reconstruct", post(reconstruct))
        .route("/operator/refresh/:vin", post(refresh))
        .route("/operator/disconnect/:vin", post(disconnect))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<Uuid>,
}

/// `POST /webhook/:user_id`: parse one provider payload and append it to the
/// event store (spec §4.2/§4.3). The dispatcher picks it up on its next
/// tick; this endpoint never runs the state machine inline.
async fn webhook(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    if !state.authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(WebhookResponse { accepted: false, event_id: None }));
    }

    let event = match parser::parse(&payload, &user_id, EventSource::Webhook, SystemTime::now()) {
        Ok(event) => event,
        Err(e) => {
            warn!("rejected webhook payload for user {user_id}: {e}");
            return (StatusCode::BAD_REQUEST, Json(WebhookResponse { accepted: false, event_id: None }));
        }
    };

    let event_id = event.id;
    match state.event_store.append(event) {
        Ok(()) => (StatusCode::OK, Json(WebhookResponse { accepted: true, event_id: Some(event_id) })),
        Err(e) => {
            error!("failed to persist webhook event for user {user_id}: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(WebhookResponse { accepted: false, event_id: None }))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReconstructRequest {
    user_id: String,
    vin: String,
    #[serde(default = "default_since_hours")]
    since_hours: u64,
}

fn default_since_hours() -> u64 {
    24
}

/// `POST /operator/reconstruct`: on-demand trip recovery (spec §4.8).
async fn reconstruct(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(req): Json<ReconstructRequest>) -> impl IntoResponse {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match state.reconstructor.reconstruct(&req.user_id, &req.vin, req.since_hours).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!("reconstruct failed for vin {}: {e}", req.vin);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    refreshed: bool,
}

/// `POST /operator/refresh/:vin`: pull current vehicle data from the
/// upstream provider and fold it into the connection snapshot (spec §6).
async fn refresh(State(state): State<Arc<AppState>>, Path(vin): Path<String>, headers: HeaderMap) -> impl IntoResponse {
    if !state.authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(RefreshResponse { refreshed: false })).into_response();
    }

    match do_refresh(&state, &vin).await {
        Ok(()) => (StatusCode::OK, Json(RefreshResponse { refreshed: true })).into_response(),
        Err(e) => {
            warn!("refresh failed for vin {vin}: {e}");
            e.into_response()
        }
    }
}

async fn do_refresh(state: &AppState, vin: &str) -> Result<(), ServerError> {
    let upstream = state.upstream.as_ref().ok_or(ServerError::UpstreamNotConfigured)?;
    let data = upstream.fetch_vehicle_data(vin).await.map_err(|e| ServerError::Upstream(e.to_string()))?;

    let vehicle = state.vehicle_store.find_by_vin(vin).await?.ok_or(ServerError::VehicleNotFound)?;

    state.connection_store.update(vin, &vehicle.user_id, &vehicle.id, |conn| {
        crate::collaborators_http::apply_upstream_snapshot(conn, &data);
    });

    if let Some(odo) = data.odometer_km {
        if let Err(e) = state.vehicle_store.update_odometer_km(&vehicle.id, odo).await {
            warn!("failed to persist refreshed odometer for vin {vin}: {e}");
        }
    }
    if let Some(level) = data.battery_level {
        if let Err(e) = state.vehicle_store.update_battery_level(&vehicle.id, level).await {
            warn!("failed to persist refreshed battery level for vin {vin}: {e}");
        }
    }

    Ok(())
}

/// `POST /operator/disconnect/:vin`: drop the hot connection state for a
/// VIN. Any trip in progress is abandoned, not closed out — an operator
/// tool of last resort, not part of the regular lifecycle.
async fn disconnect(State(state): State<Arc<AppState>>, Path(vin): Path<String>, headers: HeaderMap) -> impl IntoResponse {
    if !state.authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }

    match state.connection_store.remove(&vin) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

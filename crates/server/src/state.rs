//! Shared application state wired from `main.rs`, handed to every HTTP
//! handler and background loop as an `Arc<AppState>`.

use drivelog::collaborators::{UpstreamProvider, VehicleStore};
use drivelog::store::{ConnectionStore, EventStore};
use drivelog::{Dispatcher, Reaper, Reconstructor};
use std::sync::Arc;

pub struct AppState {
    pub event_store: Arc<dyn EventStore>,
    pub connection_store: Arc<ConnectionStore>,
    pub vehicle_store: Arc<dyn VehicleStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub reaper: Arc<Reaper>,
    pub reconstructor: Arc<Reconstructor>,
    pub upstream: Option<Arc<dyn UpstreamProvider>>,
    pub shared_secret: Option<String>,
}

impl AppState {
    /// Bearer-token check for `spec §6`'s "optional shared-secret auth"; a
    /// server started without `--shared-secret` accepts every request.
    pub fn authorized(&self, headers: &axum::http::HeaderMap) -> bool {
        let Some(expected) = &self.shared_secret else { return true };
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected)
    }
}

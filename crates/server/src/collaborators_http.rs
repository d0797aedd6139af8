//! HTTP-backed collaborators (spec §6): reverse geocoding, road-snapping,
//! and the upstream vehicle-data provider, all best-effort over `reqwest`.
//!
//! Every call is bounded (spec §5: "every outbound HTTP call uses a bounded
//! timeout... Timeouts are treated as soft failures") and never propagates
//! a transport error up into the trip pipeline — geocode/snap degrade to
//! `None`, the provider call surfaces a `DrivelogError` that the caller
//! (the `refresh` operator command) is free to report but the dispatcher
//! never blocks on.

use async_trait::async_trait;
use drivelog::collaborators::{ReverseGeocoder, RoadSnapper, UpstreamProvider, UpstreamVehicleData};
use drivelog::error::{DrivelogError, Result};
use drivelog_types::{VehicleConnection, Waypoint};
use reqwest::Client;
use std::time::Duration;
use tracing::warn;

const GEOCODE_SNAP_TIMEOUT: Duration = Duration::from_secs(10);
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .expect("reqwest client configuration is static and always valid")
}

pub struct HttpGeocoder {
    client: Client,
    base_url: String,
}

impl HttpGeocoder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: build_client(GEOCODE_SNAP_TIMEOUT),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ReverseGeocoder for HttpGeocoder {
    async fn reverse_geocode(&self, lat: f64, lon: f64) -> Option<String> {
        let url = format!("{}/reverse", self.base_url.trim_end_matches('/'));
        let result = self.client.get(&url).query(&[("lat", lat), ("lon", lon)]).send().await;

        match result {
            Ok(resp) if resp.status().is_success() => match resp.json::<GeocodeResponse>().await {
                Ok(body) => Some(body.address),
                Err(e) => {
                    warn!("geocode response decode failed: {e}");
                    None
                }
            },
            Ok(resp) => {
                warn!("geocode request returned {}", resp.status());
                None
            }
            Err(e) => {
                warn!("geocode request failed: {e}");
                None
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct GeocodeResponse {
    address: String,
}

pub struct HttpRoadSnapper {
    client: Client,
    base_url: String,
}

impl HttpRoadSnapper {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: build_client(GEOCODE_SNAP_TIMEOUT),
            base_url: base_url.into(),
        }
    }
}

#[derive(serde::Serialize)]
struct SnapRequest<'a> {
    waypoints: &'a [Waypoint],
}

#[derive(serde::Deserialize)]
struct SnapResponse {
    waypoints: Vec<Waypoint>,
}

#[async_trait]
impl RoadSnapper for HttpRoadSnapper {
    async fn snap(&self, waypoints: &[Waypoint]) -> Option<Vec<Waypoint>> {
        let url = format!("{}/snap", self.base_url.trim_end_matches('/'));
        let result = self.client.post(&url).json(&SnapRequest { waypoints }).send().await;

        match result {
            Ok(resp) if resp.status().is_success() => match resp.json::<SnapResponse>().await {
                Ok(body) => Some(body.waypoints),
                Err(e) => {
                    warn!("road-snap response decode failed: {e}");
                    None
                }
            },
            Ok(resp) => {
                warn!("road-snap request returned {}", resp.status());
                None
            }
            Err(e) => {
                warn!("road-snap request failed: {e}");
                None
            }
        }
    }
}

pub struct HttpUpstreamProvider {
    client: Client,
    base_url: String,
}

impl HttpUpstreamProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: build_client(PROVIDER_TIMEOUT),
            base_url: base_url.into(),
        }
    }
}

#[derive(serde::Deserialize, Default)]
struct UpstreamResponse {
    drive_state: Option<String>,
    vehicle_state: Option<drivelog_types::VehicleState>,
    odometer_km: Option<f64>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    battery_level: Option<u8>,
}

#[async_trait]
impl UpstreamProvider for HttpUpstreamProvider {
    async fn fetch_vehicle_data(&self, vin: &str) -> Result<UpstreamVehicleData> {
        let url = format!("{}/vehicles/{}", self.base_url.trim_end_matches('/'), vin);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DrivelogError::InvalidInput(format!("upstream provider unreachable: {e}")))?;

        if !resp.status().is_success() {
            return Err(DrivelogError::NotFound(format!("upstream provider returned {} for vin {vin}", resp.status())));
        }

        let body: UpstreamResponse = resp
            .json()
            .await
            .map_err(|e| DrivelogError::Serialization(format!("upstream response decode failed: {e}")))?;
        Ok(UpstreamVehicleData {
            drive_state: body.drive_state,
            vehicle_state: body.vehicle_state,
            odometer_km: body.odometer_km,
            latitude: body.latitude,
            longitude: body.longitude,
            battery_level: body.battery_level,
        })
    }
}

/// Apply a `refresh` result onto a connection snapshot (spec §6:
/// `refresh(connectionId)` "pull current vehicle data from upstream and
/// update snapshot").
pub fn apply_upstream_snapshot(conn: &mut VehicleConnection, data: &UpstreamVehicleData) {
    if let Some(odo) = data.odometer_km {
        conn.last_odometer_km = Some(odo);
    }
    if let (Some(lat), Some(lon)) = (data.latitude, data.longitude) {
        conn.last_latitude = Some(lat);
        conn.last_longitude = Some(lon);
    }
}

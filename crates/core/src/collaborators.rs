//! Traits for the external collaborators the core consumes but does not
//! implement (spec §6): reverse geocoding, road-snapping, the upstream
//! telemetry provider, the vehicle store, and the geofence store.
//!
//! `drivelog-server` supplies HTTP-backed implementations; this module also
//! ships small in-memory stand-ins used by tests and the reconstructor CLI.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use drivelog_types::{Geofence, Vehicle, VehicleState};

/// `(lat, lon) -> "street, district, city"`. Must degrade gracefully; a
/// `None` return means the caller falls back to a `"lat,lon"` string
/// (spec §6).
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse_geocode(&self, lat: f64, lon: f64) -> Option<String>;
}

/// `waypoints[] -> snapped[] | null`. Must never throw; implementations
/// should downsample their input to <= 100 points before calling out.
#[async_trait]
pub trait RoadSnapper: Send + Sync {
    async fn snap(&self, waypoints: &[(f64, f64)]) -> Option<Vec<(f64, f64)>>;
}

/// Upstream vehicle state as reported by `fetchVehicleData` (spec §6),
/// used only for best-effort auto-enrichment and the `refresh` operator
/// command.
#[derive(Debug, Clone, Default)]
pub struct UpstreamVehicleData {
    pub drive_state: Option<String>,
    pub vehicle_state: Option<VehicleState>,
    pub odometer_km: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub battery_level: Option<u8>,
}

#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    async fn fetch_vehicle_data(&self, vin: &str) -> Result<UpstreamVehicleData>;
}

#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn get(&self, vehicle_id: &str) -> Result<Option<Vehicle>>;
    /// Resolves the vehicle record tied to a VIN, used by the dispatcher to
    /// learn a connection's `vehicle_id` the first time a VIN is seen.
    async fn find_by_vin(&self, vin: &str) -> Result<Option<Vehicle>>;
    /// Only writes when `odometer_km` is strictly greater than the stored
    /// value (spec §4.6: "the underlying vehicle odometer update is
    /// monotonic").
    async fn update_odometer_km(&self, vehicle_id: &str, odometer_km: f64) -> Result<()>;
    async fn update_battery_level(&self, vehicle_id: &str, level: u8) -> Result<()>;
}

#[async_trait]
pub trait GeofenceStore: Send + Sync {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Geofence>>;
}

/// Always-fails-gracefully geocoder, useful as a default/test double.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGeocoder;

#[async_trait]
impl ReverseGeocoder for NullGeocoder {
    async fn reverse_geocode(&self, _lat: f64, _lon: f64) -> Option<String> {
        None
    }
}

/// Always-returns-null road-snapper, useful as a default/test double.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRoadSnapper;

#[async_trait]
impl RoadSnapper for NullRoadSnapper {
    async fn snap(&self, _waypoints: &[(f64, f64)]) -> Option<Vec<(f64, f64)>> {
        None
    }
}

/// In-memory vehicle store, primarily for tests.
#[derive(Default)]
pub struct InMemoryVehicleStore {
    vehicles: DashMap<String, Vehicle>,
}

impl InMemoryVehicleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, vehicle: Vehicle) {
        self.vehicles.insert(vehicle.id.clone(), vehicle);
    }
}

#[async_trait]
impl VehicleStore for InMemoryVehicleStore {
    async fn get(&self, vehicle_id: &str) -> Result<Option<Vehicle>> {
        Ok(self.vehicles.get(vehicle_id).map(|v| v.clone()))
    }

    async fn find_by_vin(&self, vin: &str) -> Result<Option<Vehicle>> {
        Ok(self.vehicles.iter().find(|v| v.vin == vin).map(|v| v.clone()))
    }

    async fn update_odometer_km(&self, vehicle_id: &str, odometer_km: f64) -> Result<()> {
        if let Some(mut v) = self.vehicles.get_mut(vehicle_id) {
            if odometer_km > v.current_odometer_km {
                v.current_odometer_km = (odometer_km * 10.0).round() / 10.0;
            }
        }
        Ok(())
    }

    async fn update_battery_level(&self, vehicle_id: &str, level: u8) -> Result<()> {
        if let Some(mut v) = self.vehicles.get_mut(vehicle_id) {
            v.battery_level = Some(level);
        }
        Ok(())
    }
}

/// In-memory geofence store, primarily for tests.
#[derive(Default)]
pub struct InMemoryGeofenceStore {
    fences: DashMap<String, Vec<Geofence>>,
}

impl InMemoryGeofenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, fence: Geofence) {
        self.fences.entry(fence.user_id.clone()).or_default().push(fence);
    }
}

#[async_trait]
impl GeofenceStore for InMemoryGeofenceStore {
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Geofence>> {
        Ok(self.fences.get(user_id).map(|v| v.clone()).unwrap_or_default())
    }
}

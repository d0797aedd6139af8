//! Per-user, per-VIN running state: the last-observed snapshot plus any
//! trip currently in progress.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Coarse "what is the vehicle doing" classification derived by the state
/// machine, distinct from the raw `VehicleState` reported by telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveState {
    Driving,
    Parked,
    Asleep,
    Online,
}

/// A raw `(latitude, longitude)` sample in a trip's route.
pub type Waypoint = (f64, f64);

/// Per-user, per-VIN connection state.
///
/// Invariant **I1**: `trip_in_progress() == self.trip_start_time.is_some()`,
/// and all `trip_start_*` fields are `Some` together or `None` together.
/// Invariant **I2**: `route_waypoints.len() <= MAX_WAYPOINTS` (enforced by
/// the caller via `drivelog::geo::downsample` before it would be exceeded).
/// Invariant **I3**: once `clear_trip` runs, the trip-start fields stay
/// `None` until `start_trip` is called again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleConnection {
    pub user_id: String,
    pub vin: String,
    pub vehicle_id: String,

    pub last_odometer_km: Option<f64>,
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    pub last_shift_state: Option<crate::ShiftState>,
    pub last_drive_state: Option<DriveState>,
    pub last_polled_at: Option<SystemTime>,
    pub last_gps_at: Option<SystemTime>,

    pub trip_start_time: Option<SystemTime>,
    pub trip_start_odometer_km: Option<f64>,
    pub trip_start_latitude: Option<f64>,
    pub trip_start_longitude: Option<f64>,
    pub trip_start_location: Option<String>,
    pub route_waypoints: Vec<Waypoint>,

    pub parked_since: Option<SystemTime>,
    pub idle_since: Option<SystemTime>,
    pub consecutive_errors: u32,
}

impl VehicleConnection {
    pub fn new(user_id: impl Into<String>, vin: impl Into<String>, vehicle_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            vin: vin.into(),
            vehicle_id: vehicle_id.into(),
            last_odometer_km: None,
            last_latitude: None,
            last_longitude: None,
            last_shift_state: None,
            last_drive_state: None,
            last_polled_at: None,
            last_gps_at: None,
            trip_start_time: None,
            trip_start_odometer_km: None,
            trip_start_latitude: None,
            trip_start_longitude: None,
            trip_start_location: None,
            route_waypoints: Vec::new(),
            parked_since: None,
            idle_since: None,
            consecutive_errors: 0,
        }
    }

    pub fn trip_in_progress(&self) -> bool {
        self.trip_start_time.is_some()
    }

    /// Begin a new trip. Panics in debug builds if a trip is already open —
    /// callers (the state machine) must check `trip_in_progress()` first.
    pub fn start_trip(
        &mut self,
        started_at: SystemTime,
        odometer_km: Option<f64>,
        lat: f64,
        lon: f64,
        location: String,
    ) {
        debug_assert!(!self.trip_in_progress(), "start_trip called with a trip already open");
        self.trip_start_time = Some(started_at);
        self.trip_start_odometer_km = odometer_km;
        self.trip_start_latitude = Some(lat);
        self.trip_start_longitude = Some(lon);
        self.trip_start_location = Some(location);
        self.route_waypoints = vec![(lat, lon)];
        self.parked_since = None;
        self.idle_since = None;
    }

    /// Clear the trip-in-progress slot. Invariant I3: fields stay `None`
    /// until the next `start_trip`.
    pub fn clear_trip(&mut self) {
        self.trip_start_time = None;
        self.trip_start_odometer_km = None;
        self.trip_start_latitude = None;
        self.trip_start_longitude = None;
        self.trip_start_location = None;
        self.route_waypoints.clear();
    }

    pub fn last_point(&self) -> Option<(f64, f64)> {
        match (self.last_latitude, self.last_longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

//! Completed, immutable trip records.

use crate::connection::Waypoint;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_DISTANCE_KM: f64 = 0.1;

/// Whether a trip is classified as business or private travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TripType {
    #[default]
    Private,
    Business,
}

/// A completed trip. Immutable once written by the trip writer.
///
/// Invariant **I4**: `end_odometer_km >= start_odometer_km` and
/// `distance_km >= MIN_DISTANCE_KM`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub user_id: String,
    pub vehicle_id: String,
    pub date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub start_location: String,
    pub end_location: String,
    pub start_odometer_km: f64,
    pub end_odometer_km: f64,
    pub distance_km: f64,
    pub trip_type: TripType,
    pub auto_logged: bool,
    pub start_latitude: Option<f64>,
    pub start_longitude: Option<f64>,
    pub end_latitude: Option<f64>,
    pub end_longitude: Option<f64>,
    pub route_coordinates: Vec<Waypoint>,
    pub route_geometry: Option<Vec<Waypoint>>,
    pub notes: String,
}

impl Trip {
    /// Does `self` satisfy Invariant I4?
    pub fn is_valid(&self) -> bool {
        self.end_odometer_km >= self.start_odometer_km && self.distance_km >= MIN_DISTANCE_KM
    }

    /// Odometer interval `[start, end]`, used by the reconstructor's
    /// duplicate check.
    pub fn odometer_interval(&self) -> (f64, f64) {
        (self.start_odometer_km, self.end_odometer_km)
    }
}

//! Read-only, externally-managed geofences.

use crate::trip::TripType;
use geo::Point;
use serde::{Deserialize, Serialize};

/// A circular region tagged as business or private.
///
/// Owned and mutated by user/vehicle CRUD, which is out of this core's
/// scope; the core only reads these via `GeofenceStore::list_for_user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub user_id: String,
    pub center: Point<f64>,
    /// 50.0..=5000.0
    pub radius_meters: f64,
    pub trip_type: TripType,
    pub name: String,
}

impl Geofence {
    pub fn new(user_id: impl Into<String>, lat: f64, lon: f64, radius_meters: f64, trip_type: TripType, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            center: Point::new(lon, lat),
            radius_meters,
            trip_type,
            name: name.into(),
        }
    }
}

//! Trip writer (spec §4.6): turns an `EndTrip` into a persisted [`Trip`], or
//! discards it if it never covered enough distance to count.

use crate::collaborators::{GeofenceStore, ReverseGeocoder, RoadSnapper, VehicleStore};
use crate::error::Result;
use crate::geo::{downsample, find_matching_fence, haversine};
use crate::store::TripStore;
use chrono::Utc;
use drivelog_types::{Trip, TripType, Waypoint, MIN_DISTANCE_KM};
use log::{debug, warn};
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

/// Why a trip in progress was closed. Carried through into the trip's
/// `notes` field for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTripReason {
    GpsTimeout,
    Stale,
    ShiftedToPark,
    Offline,
    /// Reaper-driven force-close of a trip that outlived `staleTrip` (spec §4.7).
    StaleAge,
    /// Segment recovered by the on-demand reconstructor (spec §4.8), never
    /// produced by the state machine itself.
    Reconstructed,
}

impl EndTripReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EndTripReason::GpsTimeout => "gps_timeout",
            EndTripReason::Stale => "stale",
            EndTripReason::ShiftedToPark => "shifted_to_park",
            EndTripReason::Offline => "offline",
            EndTripReason::StaleAge => "stale_age",
            EndTripReason::Reconstructed => "reconstructed",
        }
    }
}

/// Everything the writer needs to close out one trip. Built from the
/// `VehicleConnection` snapshot at `EndTrip` time (state machine or reaper).
#[derive(Debug, Clone)]
pub struct EndTripInput {
    pub user_id: String,
    pub vehicle_id: String,
    pub reason: EndTripReason,

    pub start_time: SystemTime,
    pub start_odometer_km: Option<f64>,
    pub start_latitude: Option<f64>,
    pub start_longitude: Option<f64>,
    pub start_location: String,

    pub end_time: SystemTime,
    pub end_odometer_km: Option<f64>,
    pub end_latitude: Option<f64>,
    pub end_longitude: Option<f64>,

    pub route_waypoints: Vec<Waypoint>,
}

pub(crate) fn compute_distance_km(
    start_odo: Option<f64>,
    end_odo: Option<f64>,
    start_pt: Option<(f64, f64)>,
    end_pt: Option<(f64, f64)>,
) -> Option<(f64, &'static str)> {
    if let (Some(start), Some(end)) = (start_odo, end_odo) {
        if end > start {
            return Some((end - start, "odometer"));
        }
    }
    if let (Some(a), Some(b)) = (start_pt, end_pt) {
        Some((haversine(a.0, a.1, b.0, b.1) / 1000.0, "gps"))
    } else {
        None
    }
}

/// Resolve `(startOdo, endOdo)` per the reconciliation rules in spec §4.6.
pub(crate) fn reconcile_odometer(
    start_odo: Option<f64>,
    end_odo: Option<f64>,
    distance_km: f64,
    vehicle_base_km: f64,
) -> (f64, f64) {
    let (start, mut end) = match (start_odo, end_odo) {
        (Some(s), Some(e)) => (s, e),
        (Some(s), None) => (s, s + distance_km),
        (None, Some(e)) => (e - distance_km, e),
        (None, None) => (vehicle_base_km, vehicle_base_km + distance_km),
    };
    if end < start {
        end = start + distance_km;
    }
    (start, end)
}

fn classify(
    fences: &[drivelog_types::Geofence],
    start_pt: Option<(f64, f64)>,
    end_pt: Option<(f64, f64)>,
) -> TripType {
    for pt in [start_pt, end_pt].into_iter().flatten() {
        if let Some(fence) = find_matching_fence(pt.0, pt.1, fences) {
            if fence.trip_type == TripType::Business {
                return TripType::Business;
            }
        }
    }
    TripType::Private
}

pub struct TripWriter {
    trip_store: Arc<dyn TripStore>,
    vehicle_store: Arc<dyn VehicleStore>,
    geofence_store: Arc<dyn GeofenceStore>,
    geocoder: Arc<dyn ReverseGeocoder>,
    road_snapper: Arc<dyn RoadSnapper>,
    /// Max waypoints handed to the road-snapper in one call (spec §6 note:
    /// "implementations should downsample ... before calling out").
    snap_sample_size: usize,
}

impl TripWriter {
    pub fn new(
        trip_store: Arc<dyn TripStore>,
        vehicle_store: Arc<dyn VehicleStore>,
        geofence_store: Arc<dyn GeofenceStore>,
        geocoder: Arc<dyn ReverseGeocoder>,
        road_snapper: Arc<dyn RoadSnapper>,
    ) -> Self {
        Self {
            trip_store,
            vehicle_store,
            geofence_store,
            geocoder,
            road_snapper,
            snap_sample_size: 100,
        }
    }

    /// Close out a trip. Returns `Ok(None)` when the trip never covered
    /// `MIN_DISTANCE_KM` and was discarded, per spec §4.6.
    pub async fn write(&self, input: EndTripInput) -> Result<Option<Trip>> {
        let start_pt = match (input.start_latitude, input.start_longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        };
        let end_pt = match (input.end_latitude, input.end_longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        };

        let distance = compute_distance_km(input.start_odometer_km, input.end_odometer_km, start_pt, end_pt);
        let distance_km = match distance {
            Some((d, _)) if d >= MIN_DISTANCE_KM => d,
            _ => {
                debug!(
                    "discarding trip for vehicle {} below MIN_DISTANCE_KM (reason={})",
                    input.vehicle_id,
                    input.reason.as_str()
                );
                return Ok(None);
            }
        };
        let source = distance.map(|(_, s)| s).unwrap_or("gps");

        let vehicle = self.vehicle_store.get(&input.vehicle_id).await?;
        let base_km = vehicle.as_ref().map(|v| v.current_odometer_km).unwrap_or(0.0);
        let (start_odo, end_odo) = reconcile_odometer(input.start_odometer_km, input.end_odometer_km, distance_km, base_km);

        let fences = self.geofence_store.list_for_user(&input.user_id).await?;
        let trip_type = classify(&fences, start_pt, end_pt);

        let end_location = match end_pt {
            Some((lat, lon)) => self
                .geocoder
                .reverse_geocode(lat, lon)
                .await
                .unwrap_or_else(|| format!("{lat},{lon}")),
            None => "Unknown".to_string(),
        };

        let route_geometry = if input.route_waypoints.len() >= 2 {
            let sample = downsample(&input.route_waypoints, self.snap_sample_size);
            self.road_snapper.snap(&sample).await
        } else {
            None
        };
        if input.route_waypoints.len() >= 2 && route_geometry.is_none() {
            warn!("road-snap unavailable for vehicle {}, keeping raw waypoints", input.vehicle_id);
        }

        let notes = if source == "gps" {
            "Distance estimated via GPS (odometer unavailable)".to_string()
        } else {
            format!("Distance from odometer delta, ended by {}", input.reason.as_str())
        };

        let start_time: chrono::DateTime<Utc> = input.start_time.into();
        let end_time: chrono::DateTime<Utc> = input.end_time.into();

        let trip = Trip {
            id: Uuid::new_v4(),
            user_id: input.user_id.clone(),
            vehicle_id: input.vehicle_id.clone(),
            date: start_time.date_naive(),
            start_time: start_time.to_rfc3339(),
            end_time: end_time.to_rfc3339(),
            start_location: input.start_location,
            end_location,
            start_odometer_km: start_odo,
            end_odometer_km: end_odo,
            distance_km,
            trip_type,
            auto_logged: true,
            start_latitude: input.start_latitude,
            start_longitude: input.start_longitude,
            end_latitude: input.end_latitude,
            end_longitude: input.end_longitude,
            route_coordinates: input.route_waypoints,
            route_geometry,
            notes,
        };

        debug_assert!(trip.is_valid(), "trip writer produced a trip violating invariant I4");
        self.trip_store.append(trip.clone())?;
        self.vehicle_store.update_odometer_km(&input.vehicle_id, end_odo).await?;

        Ok(Some(trip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryGeofenceStore, InMemoryVehicleStore, NullGeocoder, NullRoadSnapper};
    use crate::store::InMemoryTripStore;
    use drivelog_types::Vehicle;
    use std::time::Duration;

    fn writer() -> (TripWriter, Arc<InMemoryTripStore>, Arc<InMemoryVehicleStore>) {
        let trips = Arc::new(InMemoryTripStore::new());
        let vehicles = Arc::new(InMemoryVehicleStore::new());
        vehicles.insert(Vehicle {
            id: "veh1".into(),
            user_id: "u1".into(),
            vin: "VIN1".into(),
            current_odometer_km: 1000.0,
            battery_level: None,
        });
        let geofences = Arc::new(InMemoryGeofenceStore::new());
        let writer = TripWriter::new(
            trips.clone(),
            vehicles.clone(),
            geofences,
            Arc::new(NullGeocoder),
            Arc::new(NullRoadSnapper),
        );
        (writer, trips, vehicles)
    }

    fn base_input() -> EndTripInput {
        let now = SystemTime::now();
        EndTripInput {
            user_id: "u1".into(),
            vehicle_id: "veh1".into(),
            reason: EndTripReason::ShiftedToPark,
            start_time: now,
            start_odometer_km: Some(1000.0),
            start_latitude: Some(59.0),
            start_longitude: Some(18.0),
            start_location: "start".into(),
            end_time: now + Duration::from_secs(600),
            end_odometer_km: Some(1005.0),
            end_latitude: Some(59.1),
            end_longitude: Some(18.1),
            route_waypoints: vec![(59.0, 18.0), (59.1, 18.1)],
        }
    }

    #[tokio::test]
    async fn odometer_sourced_distance_wins_over_gps_p1() {
        let (writer, _, vehicles) = writer();
        let trip = writer.write(base_input()).await.unwrap().unwrap();
        assert_eq!(trip.distance_km, 5.0);
        assert_eq!(trip.start_odometer_km, 1000.0);
        assert_eq!(trip.end_odometer_km, 1005.0);
        assert_eq!(vehicles.get("veh1").await.unwrap().unwrap().current_odometer_km, 1005.0);
    }

    #[tokio::test]
    async fn gps_fallback_when_odometer_absent() {
        let (writer, _, _) = writer();
        let mut input = base_input();
        input.start_odometer_km = None;
        input.end_odometer_km = None;
        let trip = writer.write(input).await.unwrap().unwrap();
        assert!(trip.notes.contains("GPS"));
        assert!(trip.distance_km > 0.0);
    }

    #[tokio::test]
    async fn discards_below_minimum_distance() {
        let (writer, trips, _) = writer();
        let mut input = base_input();
        input.end_odometer_km = Some(1000.01);
        input.end_latitude = Some(59.0001);
        input.end_longitude = Some(18.0001);
        let result = writer.write(input).await.unwrap();
        assert!(result.is_none());
        assert!(trips.list_by_user("u1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn end_odometer_never_goes_below_start() {
        let (writer, _, _) = writer();
        let mut input = base_input();
        input.end_odometer_km = Some(990.0); // reported lower than start
        let trip = writer.write(input).await.unwrap().unwrap();
        assert!(trip.end_odometer_km >= trip.start_odometer_km);
        assert!(trip.is_valid());
    }

    #[tokio::test]
    async fn business_fence_at_either_end_classifies_business() {
        let trips = Arc::new(InMemoryTripStore::new());
        let vehicles = Arc::new(InMemoryVehicleStore::new());
        vehicles.insert(Vehicle {
            id: "veh1".into(),
            user_id: "u1".into(),
            vin: "VIN1".into(),
            current_odometer_km: 1000.0,
            battery_level: None,
        });
        let geofences = Arc::new(InMemoryGeofenceStore::new());
        geofences.insert(drivelog_types::Geofence::new("u1", 59.1, 18.1, 200.0, TripType::Business, "office"));
        let writer = TripWriter::new(trips, vehicles, geofences, Arc::new(NullGeocoder), Arc::new(NullRoadSnapper));

        let trip = writer.write(base_input()).await.unwrap().unwrap();
        assert_eq!(trip.trip_type, TripType::Business);
    }
}

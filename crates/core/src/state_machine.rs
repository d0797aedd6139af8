//! Trip lifecycle state machine (spec §4.5). The state is the
//! [`VehicleConnection`]; the machine reacts to one [`TelemetryEvent`] at a
//! time and may hand off to the [`TripWriter`].

use crate::collaborators::{ReverseGeocoder, VehicleStore};
use crate::error::Result;
use crate::geo::haversine;
use crate::writer::{EndTripInput, EndTripReason, TripWriter};
use drivelog_types::{DriveState, EngineConfig, TelemetryEvent, VehicleConnection};
use log::{info, warn};
use std::sync::Arc;
use std::time::SystemTime;

/// Movement threshold below which a GPS fix is disregarded as jitter when
/// there's no shift-state signal to corroborate driving (spec §4.5).
const STATIONARY_JITTER_METERS: f64 = 50.0;
const ODOMETER_JITTER_KM: f64 = 0.1;

struct DerivedSignals {
    has_gps: bool,
    moved_meters: f64,
    odo_delta_km: f64,
    shift_driving: bool,
    shift_parked: bool,
    offline: bool,
}

fn derive(conn: &VehicleConnection, event: &TelemetryEvent) -> DerivedSignals {
    let has_gps = event.has_gps();

    let moved_meters = if has_gps {
        match (conn.last_latitude, conn.last_longitude, event.lat_lon()) {
            (Some(lat0), Some(lon0), Some((lat1, lon1))) => haversine(lat0, lon0, lat1, lon1),
            _ => 0.0,
        }
    } else {
        0.0
    };

    let odo_delta_km = match (event.odometer_km, conn.last_odometer_km) {
        (Some(e), Some(c)) => e - c,
        _ => 0.0,
    };

    let shift_driving = event.shift_state.map(|s| s.is_driving()).unwrap_or(false);
    let shift_parked = event.shift_state.map(|s| s.is_parked()).unwrap_or(false);
    let offline = event.vehicle_state.map(|v| v.is_offline()).unwrap_or(false);

    DerivedSignals {
        has_gps,
        moved_meters,
        odo_delta_km,
        shift_driving,
        shift_parked,
        offline,
    }
}

impl DerivedSignals {
    fn is_driving(&self, event: &TelemetryEvent) -> bool {
        !self.offline
            && (self.shift_driving
                || (event.shift_state.is_none()
                    && (self.moved_meters > STATIONARY_JITTER_METERS
                        || event.speed.map(|s| s.value > 0.0).unwrap_or(false)
                        || self.odo_delta_km > ODOMETER_JITTER_KM)))
    }
}

pub struct StateMachine {
    writer: Arc<TripWriter>,
    geocoder: Arc<dyn ReverseGeocoder>,
    vehicle_store: Arc<dyn VehicleStore>,
    config: EngineConfig,
}

impl StateMachine {
    pub fn new(
        writer: Arc<TripWriter>,
        geocoder: Arc<dyn ReverseGeocoder>,
        vehicle_store: Arc<dyn VehicleStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            writer,
            geocoder,
            vehicle_store,
            config,
        }
    }

    /// Apply `event` to `conn` in place. Returns `Err` only on a storage
    /// failure from the trip writer or vehicle store; callers must leave
    /// the event unprocessed and not commit `conn` when that happens
    /// (spec §7: "the event is left unprocessed so the next tick retries
    /// from a consistent state").
    pub async fn process(&self, conn: &mut VehicleConnection, event: &TelemetryEvent) -> Result<()> {
        let signals = derive(conn, event);

        if event.is_state_only() {
            return self.handle_state_only(conn, event, &signals).await;
        }

        conn.last_polled_at = Some(event.created_at);
        if let Some(odo) = event.odometer_km {
            conn.last_odometer_km = Some(odo);
        }
        if let Some((lat, lon)) = event.lat_lon() {
            conn.last_latitude = Some(lat);
            conn.last_longitude = Some(lon);
            conn.last_gps_at = Some(event.created_at);
        }
        self.push_vehicle_snapshot(conn, event).await;

        if conn.trip_in_progress() {
            if let Some(started_at) = conn.trip_start_time {
                if elapsed_at_least(started_at, event.created_at, self.config.stale_trip) {
                    self.end_trip(conn, event.created_at, EndTripReason::Stale).await?;
                }
            }
        }

        if conn.trip_in_progress() && event.shift_state == Some(drivelog_types::ShiftState::P) {
            self.end_trip(conn, event.created_at, EndTripReason::ShiftedToPark).await?;
        } else if !conn.trip_in_progress()
            && signals.has_gps
            && signals.moved_meters > self.config.trip_start_movement_meters
        {
            self.start_trip(conn, event).await;
        } else if conn.trip_in_progress() && signals.has_gps {
            self.extend_trip(conn, event);
        } else if signals.offline && conn.trip_in_progress() {
            self.end_trip(conn, event.created_at, EndTripReason::Offline).await?;
        } else {
            conn.last_drive_state = Some(drive_state(&signals, event));
        }

        Ok(())
    }

    async fn handle_state_only(
        &self,
        conn: &mut VehicleConnection,
        event: &TelemetryEvent,
        signals: &DerivedSignals,
    ) -> Result<()> {
        conn.last_polled_at = Some(event.created_at);
        if signals.offline {
            conn.last_drive_state = Some(DriveState::Asleep);
        }

        if conn.trip_in_progress() {
            if let Some(last_gps_at) = conn.last_gps_at {
                if elapsed_at_least(last_gps_at, event.created_at, self.config.gps_silence) {
                    self.end_trip(conn, event.created_at, EndTripReason::GpsTimeout).await?;
                }
            }
        }
        Ok(())
    }

    async fn start_trip(&self, conn: &mut VehicleConnection, event: &TelemetryEvent) {
        let (lat, lon) = event.lat_lon().expect("start_trip requires a GPS fix");
        let location = self
            .geocoder
            .reverse_geocode(lat, lon)
            .await
            .unwrap_or_else(|| format!("{lat},{lon}"));
        conn.start_trip(event.created_at, event.odometer_km, lat, lon, location);
    }

    fn extend_trip(&self, conn: &mut VehicleConnection, event: &TelemetryEvent) {
        let Some((lat, lon)) = event.lat_lon() else { return };
        let should_append = match conn.route_waypoints.last() {
            Some(&(last_lat, last_lon)) => haversine(last_lat, last_lon, lat, lon) >= self.config.waypoint_movement_meters,
            None => true,
        };
        if should_append {
            if conn.route_waypoints.len() >= self.config.max_waypoints {
                // Leave room for the point we're about to push so invariant
                // I2 (`len() <= max_waypoints`) holds afterward.
                conn.route_waypoints = crate::geo::downsample(&conn.route_waypoints, self.config.max_waypoints - 1);
            }
            conn.route_waypoints.push((lat, lon));
        }
        conn.parked_since = None;
    }

    async fn push_vehicle_snapshot(&self, conn: &VehicleConnection, event: &TelemetryEvent) {
        if let Some(odo) = event.odometer_km {
            if let Err(e) = self.vehicle_store.update_odometer_km(&conn.vehicle_id, odo).await {
                warn!("vehicle snapshot odometer push failed for {}: {e}", conn.vehicle_id);
            }
        }
        if let Some(level) = event.battery_level {
            if let Err(e) = self.vehicle_store.update_battery_level(&conn.vehicle_id, level).await {
                warn!("vehicle snapshot battery push failed for {}: {e}", conn.vehicle_id);
            }
        }
    }

    /// Hand off the in-progress trip to the writer and reset the
    /// connection's trip-in-progress slot, per spec §4.5 `EndTrip(reason)`.
    ///
    /// `now` is the triggering event's timestamp when called from
    /// [`process`](Self::process), or the reaper's sweep time when called
    /// from a force-close.
    pub async fn end_trip(&self, conn: &mut VehicleConnection, now: SystemTime, reason: EndTripReason) -> Result<()> {
        let input = EndTripInput {
            user_id: conn.user_id.clone(),
            vehicle_id: conn.vehicle_id.clone(),
            reason,
            start_time: conn.trip_start_time.unwrap_or(now),
            start_odometer_km: conn.trip_start_odometer_km,
            start_latitude: conn.trip_start_latitude,
            start_longitude: conn.trip_start_longitude,
            start_location: conn.trip_start_location.clone().unwrap_or_default(),
            end_time: now,
            end_odometer_km: conn.last_odometer_km,
            end_latitude: conn.last_latitude,
            end_longitude: conn.last_longitude,
            route_waypoints: conn.route_waypoints.clone(),
        };

        match self.writer.write(input).await {
            Ok(Some(trip)) => info!("closed trip {} for vehicle {} ({})", trip.id, conn.vehicle_id, reason.as_str()),
            Ok(None) => info!("discarded sub-threshold trip for vehicle {} ({})", conn.vehicle_id, reason.as_str()),
            Err(e) => {
                warn!("trip write failed for vehicle {}: {e}", conn.vehicle_id);
                return Err(e);
            }
        }

        conn.clear_trip();
        conn.last_drive_state = Some(DriveState::Parked);
        conn.idle_since = Some(now);
        conn.consecutive_errors = 0;
        Ok(())
    }
}

fn drive_state(signals: &DerivedSignals, event: &TelemetryEvent) -> DriveState {
    if signals.offline {
        DriveState::Asleep
    } else if signals.is_driving(event) {
        DriveState::Driving
    } else {
        DriveState::Parked
    }
}

fn elapsed_at_least(earlier: SystemTime, later: SystemTime, threshold: std::time::Duration) -> bool {
    later.duration_since(earlier).map(|d| d >= threshold).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryGeofenceStore, InMemoryVehicleStore, NullGeocoder, NullRoadSnapper};
    use crate::store::InMemoryTripStore;
    use drivelog_types::{EventSource, ShiftState, Vehicle, VehicleState};
    use std::time::Duration;
    use uuid::Uuid;

    fn machine() -> StateMachine {
        let trips = Arc::new(InMemoryTripStore::new());
        let vehicles = Arc::new(InMemoryVehicleStore::new());
        vehicles.insert(Vehicle {
            id: "veh1".into(),
            user_id: "u1".into(),
            vin: "VIN1".into(),
            current_odometer_km: 100.0,
            battery_level: None,
        });
        let geofences = Arc::new(InMemoryGeofenceStore::new());
        let writer = Arc::new(TripWriter::new(
            trips,
            vehicles.clone(),
            geofences,
            Arc::new(NullGeocoder),
            Arc::new(NullRoadSnapper),
        ));
        StateMachine::new(writer, Arc::new(NullGeocoder), vehicles, EngineConfig::default())
    }

    fn event(created_at: SystemTime) -> TelemetryEvent {
        TelemetryEvent {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            vin: "VIN1".into(),
            created_at,
            source: EventSource::Webhook,
            shift_state: None,
            speed: None,
            odometer_km: None,
            latitude: None,
            longitude: None,
            battery_level: None,
            vehicle_state: None,
            processed: false,
            raw_payload: None,
        }
    }

    #[tokio::test]
    async fn trip_starts_after_jitter_filter_then_extends_and_ends_on_park() {
        let sm = machine();
        let mut conn = VehicleConnection::new("u1", "VIN1", "veh1");
        let t0 = SystemTime::now();

        // First GPS fix just establishes a baseline; no prior point means
        // moved_meters is 0, so no trip starts yet.
        let mut e0 = event(t0);
        e0.latitude = Some(59.0);
        e0.longitude = Some(18.0);
        e0.odometer_km = Some(100.0);
        sm.process(&mut conn, &e0).await.unwrap();
        assert!(!conn.trip_in_progress());

        // Second fix ~40m away clears the 30m jitter filter.
        let mut e1 = event(t0 + Duration::from_secs(5));
        e1.latitude = Some(59.00036);
        e1.longitude = Some(18.0);
        e1.odometer_km = Some(100.1);
        sm.process(&mut conn, &e1).await.unwrap();
        assert!(conn.trip_in_progress());
        assert_eq!(conn.route_waypoints.len(), 1);

        // Shift to park ends the trip.
        let mut e2 = event(t0 + Duration::from_secs(600));
        e2.shift_state = Some(ShiftState::P);
        e2.latitude = Some(59.01);
        e2.longitude = Some(18.01);
        e2.odometer_km = Some(101.0);
        sm.process(&mut conn, &e2).await.unwrap();
        assert!(!conn.trip_in_progress());
    }

    #[tokio::test]
    async fn state_only_event_force_closes_trip_after_gps_silence() {
        let sm = machine();
        let mut conn = VehicleConnection::new("u1", "VIN1", "veh1");
        let t0 = SystemTime::now();
        conn.start_trip(t0, Some(100.0), 59.0, 18.0, "start".into());
        conn.last_odometer_km = Some(100.0);
        conn.last_latitude = Some(59.0);
        conn.last_longitude = Some(18.0);
        conn.last_gps_at = Some(t0);

        let mut poll = event(t0 + Duration::from_secs(181));
        poll.vehicle_state = Some(VehicleState::Online);
        assert!(poll.is_state_only());
        sm.process(&mut conn, &poll).await.unwrap();

        assert!(!conn.trip_in_progress());
    }

    #[tokio::test]
    async fn offline_event_during_trip_ends_it_immediately() {
        let sm = machine();
        let mut conn = VehicleConnection::new("u1", "VIN1", "veh1");
        let t0 = SystemTime::now();
        conn.start_trip(t0, Some(100.0), 59.0, 18.0, "start".into());
        conn.last_odometer_km = Some(100.0);
        conn.last_latitude = Some(59.0);
        conn.last_longitude = Some(18.0);

        // No GPS fix on this event: transition 6 (trip extend) only applies
        // when `hasGps`, so the offline branch (7) is reachable.
        let mut e = event(t0 + Duration::from_secs(30));
        e.vehicle_state = Some(VehicleState::Offline);
        e.odometer_km = Some(100.2);
        sm.process(&mut conn, &e).await.unwrap();

        assert!(!conn.trip_in_progress());
    }
}

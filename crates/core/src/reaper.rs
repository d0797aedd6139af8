//! Background sweeps that don't go through the dispatcher (spec §4.7):
//! force-closing trips the dispatcher never got a chance to end, and
//! purging expired events.

use crate::error::Result;
use crate::state_machine::StateMachine;
use crate::store::{ConnectionStore, EventStore};
use crate::writer::EndTripReason;
use drivelog_types::EngineConfig;
use log::{info, warn};
use std::sync::Arc;
use std::time::SystemTime;

pub struct Reaper {
    connection_store: Arc<ConnectionStore>,
    event_store: Arc<dyn EventStore>,
    state_machine: Arc<StateMachine>,
    config: EngineConfig,
}

impl Reaper {
    pub fn new(
        connection_store: Arc<ConnectionStore>,
        event_store: Arc<dyn EventStore>,
        state_machine: Arc<StateMachine>,
        config: EngineConfig,
    ) -> Self {
        Self {
            connection_store,
            event_store,
            state_machine,
            config,
        }
    }

    /// For every connection with a trip in progress: force-close on GPS
    /// silence, then on trip age, whichever the connection's state hits
    /// first. Returns the number of trips closed.
    pub async fn sweep_trips(&self) -> Result<usize> {
        let now = SystemTime::now();
        let mut closed = 0;

        for mut conn in self.connection_store.all_with_trip_in_progress() {
            let vin = conn.vin.clone();
            let reason = self.stale_reason(&conn, now);

            let Some(reason) = reason else { continue };

            match self.state_machine.end_trip(&mut conn, now, reason).await {
                Ok(()) => {
                    let user_id = conn.user_id.clone();
                    let vehicle_id = conn.vehicle_id.clone();
                    self.connection_store.update(&vin, &user_id, &vehicle_id, |c| *c = conn.clone());
                    closed += 1;
                    info!("reaper force-closed trip for vin {vin} ({})", reason.as_str());
                }
                Err(e) => warn!("reaper failed to close trip for vin {vin}: {e}"),
            }
        }

        Ok(closed)
    }

    fn stale_reason(&self, conn: &drivelog_types::VehicleConnection, now: SystemTime) -> Option<EndTripReason> {
        if let Some(last_gps_at) = conn.last_gps_at {
            if now.duration_since(last_gps_at).map(|d| d >= self.config.gps_silence).unwrap_or(false) {
                return Some(EndTripReason::GpsTimeout);
            }
        }
        if let Some(started_at) = conn.trip_start_time {
            if now.duration_since(started_at).map(|d| d > self.config.stale_trip).unwrap_or(false) {
                return Some(EndTripReason::StaleAge);
            }
        }
        None
    }

    /// Delete events older than `config.event_retention`. Runs hourly.
    pub async fn purge_expired_events(&self) -> Result<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(self.config.event_retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let purged = self.event_store.purge_older_than(cutoff)?;
        if purged > 0 {
            info!("retention sweep purged {purged} events older than {:?}", self.config.event_retention);
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryGeofenceStore, InMemoryVehicleStore, NullGeocoder, NullRoadSnapper};
    use crate::store::{InMemoryEventStore, InMemoryTripStore};
    use crate::writer::TripWriter;
    use drivelog_types::{EventSource, Vehicle};
    use std::time::Duration;
    use uuid::Uuid;

    fn reaper_with_config(config: EngineConfig) -> (Reaper, Arc<ConnectionStore>, Arc<InMemoryTripStore>) {
        let connections = Arc::new(ConnectionStore::new());
        let events: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let vehicles = Arc::new(InMemoryVehicleStore::new());
        vehicles.insert(Vehicle {
            id: "veh1".into(),
            user_id: "u1".into(),
            vin: "VIN1".into(),
            current_odometer_km: 0.0,
            battery_level: None,
        });
        let trips = Arc::new(InMemoryTripStore::new());
        let geofences = Arc::new(InMemoryGeofenceStore::new());
        let writer = Arc::new(TripWriter::new(
            trips.clone(),
            vehicles.clone(),
            geofences,
            Arc::new(NullGeocoder),
            Arc::new(NullRoadSnapper),
        ));
        let state_machine = Arc::new(StateMachine::new(writer, Arc::new(NullGeocoder), vehicles, config.clone()));
        let reaper = Reaper::new(connections.clone(), events, state_machine, config);
        (reaper, connections, trips)
    }

    #[tokio::test]
    async fn force_closes_trip_on_gps_silence() {
        let (reaper, connections, trips) = reaper_with_config(EngineConfig::default());
        let t0 = SystemTime::now() - Duration::from_secs(400);
        connections.update("VIN1", "u1", "veh1", |c| {
            c.start_trip(t0, Some(100.0), 59.0, 18.0, "start".into());
            c.last_odometer_km = Some(101.0);
            c.last_latitude = Some(59.01);
            c.last_longitude = Some(18.01);
            c.last_gps_at = Some(t0);
        });

        let closed = reaper.sweep_trips().await.unwrap();
        assert_eq!(closed, 1);
        assert!(!connections.get("VIN1").unwrap().trip_in_progress());
        assert_eq!(trips.list_by_user("u1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn leaves_fresh_trips_untouched() {
        let (reaper, connections, _trips) = reaper_with_config(EngineConfig::default());
        let now = SystemTime::now();
        connections.update("VIN1", "u1", "veh1", |c| {
            c.start_trip(now, Some(100.0), 59.0, 18.0, "start".into());
            c.last_gps_at = Some(now);
        });

        let closed = reaper.sweep_trips().await.unwrap();
        assert_eq!(closed, 0);
        assert!(connections.get("VIN1").unwrap().trip_in_progress());
    }

    #[tokio::test]
    async fn purge_expired_events_removes_only_old_events() {
        let (reaper, _connections, _trips) = reaper_with_config(EngineConfig::default());
        let purged = reaper.purge_expired_events().await.unwrap();
        assert_eq!(purged, 0);
    }
}

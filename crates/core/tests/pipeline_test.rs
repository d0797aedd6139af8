//! End-to-end: webhook payload -> parser -> event store -> dispatcher ->
//! state machine -> persisted trip. Exercises the same path
//! `drivelog-server`'s `/webhook/:user_id` handler and supervisor loop
//! drive in production, without any HTTP transport in the way.

use drivelog::collaborators::{InMemoryGeofenceStore, InMemoryVehicleStore, NullGeocoder, NullRoadSnapper};
use drivelog::store::{ConnectionStore, EventStore, InMemoryEventStore, InMemoryTripStore, TripStore};
use drivelog::{parser, Dispatcher, StateMachine, TripWriter};
use drivelog_types::{EngineConfig, EventSource, Vehicle};
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;

fn fixture() -> (Dispatcher, Arc<InMemoryEventStore>, Arc<InMemoryTripStore>) {
    let events = Arc::new(InMemoryEventStore::new());
    let connections = Arc::new(ConnectionStore::new());
    let vehicles = Arc::new(InMemoryVehicleStore::new());
    vehicles.insert(Vehicle {
        id: "veh1".into(),
        user_id: "u1".into(),
        vin: "VIN1".into(),
        current_odometer_km: 100.0,
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
    let state_machine = Arc::new(StateMachine::new(writer, Arc::new(NullGeocoder), vehicles.clone(), EngineConfig::default()));
    let dispatcher = Dispatcher::new(events.clone(), connections, vehicles, state_machine, EngineConfig::default());
    (dispatcher, events, trips)
}

#[tokio::test]
async fn webhook_payloads_drain_into_a_persisted_trip() {
    let (dispatcher, events, trips) = fixture();
    let t0 = SystemTime::now();

    let start = json!({"vin": "VIN1", "latitude": 59.0, "longitude": 18.0, "odometer": 100.0 / 1.609344});
    let mut event = parser::parse(&start, "u1", EventSource::Webhook, t0).unwrap();
    event.created_at = t0;
    events.append(event).unwrap();

    let moved = json!({"vin": "VIN1", "latitude": 59.0005, "longitude": 18.0, "odometerKm": 100.2});
    let mut event = parser::parse(&moved, "u1", EventSource::Webhook, t0).unwrap();
    event.created_at = t0 + std::time::Duration::from_secs(30);
    events.append(event).unwrap();

    let parked = json!({"vin": "VIN1", "shiftState": "P", "latitude": 59.01, "longitude": 18.01, "odometerKm": 101.0});
    let mut event = parser::parse(&parked, "u1", EventSource::Webhook, t0).unwrap();
    event.created_at = t0 + std::time::Duration::from_secs(600);
    events.append(event).unwrap();

    dispatcher.tick().await.unwrap();

    assert!(events.list_unprocessed(10).unwrap().is_empty());
    let persisted = trips.list_by_user("u1").unwrap();
    assert_eq!(persisted.len(), 1);
    assert!(persisted[0].distance_km > 0.0);
}

#[tokio::test]
async fn malformed_payload_is_rejected_before_reaching_the_store() {
    let payload = json!({"latitude": 59.0});
    assert!(parser::parse(&payload, "u1", EventSource::Webhook, SystemTime::now()).is_err());
}

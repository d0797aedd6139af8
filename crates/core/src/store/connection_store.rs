//! Hot state: one [`VehicleConnection`] per user/VIN, held in memory.
//!
//! Grounded in the teacher's `HotState` (`DashMap`-backed current-location
//! table): lookups and read-modify-write updates are lock-free at the
//! DashMap shard level, while §5's "writes to a `VehicleConnection` must be
//! atomic" requirement is met because the dispatcher and reaper are the only
//! writers and both go through `update`.

use dashmap::DashMap;
use drivelog_types::VehicleConnection;

#[derive(Default)]
pub struct ConnectionStore {
    connections: DashMap<String, VehicleConnection>,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, vin: &str) -> Option<VehicleConnection> {
        self.connections.get(vin).map(|entry| entry.clone())
    }

    pub fn get_or_create(&self, vin: &str, user_id: &str, vehicle_id: &str) -> VehicleConnection {
        self.connections
            .entry(vin.to_string())
            .or_insert_with(|| VehicleConnection::new(user_id, vin, vehicle_id))
            .clone()
    }

    /// Read-modify-write a connection atomically under the shard lock.
    pub fn update(&self, vin: &str, user_id: &str, vehicle_id: &str, f: impl FnOnce(&mut VehicleConnection)) {
        let mut entry = self
            .connections
            .entry(vin.to_string())
            .or_insert_with(|| VehicleConnection::new(user_id, vin, vehicle_id));
        f(&mut entry);
    }

    pub fn all_with_trip_in_progress(&self) -> Vec<VehicleConnection> {
        self.connections.iter().filter(|e| e.trip_in_progress()).map(|e| e.clone()).collect()
    }

    pub fn remove(&self, vin: &str) -> Option<VehicleConnection> {
        self.connections.remove(vin).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let store = ConnectionStore::new();
        let a = store.get_or_create("VIN1", "u1", "veh1");
        let b = store.get_or_create("VIN1", "u1", "veh1");
        assert_eq!(a.vin, b.vin);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_mutates_in_place() {
        let store = ConnectionStore::new();
        store.update("VIN1", "u1", "veh1", |c| c.last_odometer_km = Some(42.0));
        let conn = store.get("VIN1").unwrap();
        assert_eq!(conn.last_odometer_km, Some(42.0));
    }

    #[test]
    fn trip_in_progress_filter() {
        let store = ConnectionStore::new();
        store.update("VIN1", "u1", "veh1", |c| {
            c.start_trip(std::time::SystemTime::now(), Some(1.0), 1.0, 1.0, "x".into())
        });
        store.update("VIN2", "u1", "veh2", |_| {});
        let active = store.all_with_trip_in_progress();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].vin, "VIN1");
    }
}

//! Trip storage (spec §6: `append`, `listByUser`, `listByVehicleAndDate`).

use crate::error::Result;
use chrono::NaiveDate;
use drivelog_types::Trip;
use parking_lot::RwLock;

pub trait TripStore: Send + Sync {
    fn append(&self, trip: Trip) -> Result<()>;
    fn list_by_user(&self, user_id: &str) -> Result<Vec<Trip>>;
    fn list_by_vehicle_and_date(&self, vehicle_id: &str, date: NaiveDate) -> Result<Vec<Trip>>;
}

#[derive(Default)]
pub struct InMemoryTripStore {
    trips: RwLock<Vec<Trip>>,
}

impl InMemoryTripStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TripStore for InMemoryTripStore {
    fn append(&self, trip: Trip) -> Result<()> {
        debug_assert!(trip.is_valid(), "trip failed invariant I4 on write");
        self.trips.write().push(trip);
        Ok(())
    }

    fn list_by_user(&self, user_id: &str) -> Result<Vec<Trip>> {
        Ok(self.trips.read().iter().filter(|t| t.user_id == user_id).cloned().collect())
    }

    fn list_by_vehicle_and_date(&self, vehicle_id: &str, date: NaiveDate) -> Result<Vec<Trip>> {
        Ok(self
            .trips
            .read()
            .iter()
            .filter(|t| t.vehicle_id == vehicle_id && t.date == date)
            .cloned()
            .collect())
    }
}

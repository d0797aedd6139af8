//! The minimal external vehicle record the core is allowed to write.

use serde::{Deserialize, Serialize};

/// External vehicle record. The core only ever writes
/// `current_odometer_km` and `battery_level`; everything else (make,
/// model, ownership, ...) is managed by CRUD outside this core's scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub user_id: String,
    pub vin: String,
    pub current_odometer_km: f64,
    pub battery_level: Option<u8>,
}

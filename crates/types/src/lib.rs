//! Domain types shared by the drivelog trip-detection engine and its server shell.
//!
//! ## Modules
//! - **event**: canonical telemetry observations (`TelemetryEvent`)
//! - **connection**: per-VIN running state, including any trip in progress
//! - **trip**: completed, immutable trip records
//! - **geofence**: business/private geofence definitions
//! - **vehicle**: the minimal external vehicle record the core writes to
//! - **config**: engine thresholds (`EngineConfig`)

pub mod config;
pub mod connection;
pub mod event;
pub mod geofence;
pub mod trip;
pub mod vehicle;

pub use config::EngineConfig;
pub use connection::{DriveState, VehicleConnection, Waypoint};
pub use event::{EventSource, RawPayload, ShiftState, Speed, SpeedUnit, TelemetryEvent, VehicleState};
pub use geofence::Geofence;
pub use trip::{Trip, TripType, MIN_DISTANCE_KM};
pub use vehicle::Vehicle;

pub use geo::Point;

/// Common imports for downstream crates.
pub mod prelude {
    pub use crate::{
        DriveState, EngineConfig, EventSource, Geofence, ShiftState, TelemetryEvent, Trip,
        TripType, Vehicle, VehicleConnection, VehicleState, Waypoint,
    };
    pub use std::time::Duration;
}

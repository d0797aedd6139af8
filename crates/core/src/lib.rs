//! Trip-detection core: telemetry ingestion, per-VIN state machine, and
//! on-demand trip reconstruction.
//!
//! ## Modules
//! - **parser**: normalizes provider payloads into [`drivelog_types::TelemetryEvent`]
//! - **geo**: haversine distance, geofence containment, waypoint downsampling
//! - **store**: event/connection/trip persistence
//! - **collaborators**: traits for reverse geocoding, road-snapping, the
//!   upstream provider, and the vehicle/geofence stores
//! - **state_machine**: the per-event trip lifecycle
//! - **writer**: turns an `EndTrip` into a persisted [`drivelog_types::Trip`]
//! - **dispatcher**: drains unprocessed events on a timer
//! - **reaper**: force-closes stale trips and purges expired events
//! - **reconstructor**: on-demand trip recovery from raw telemetry history

pub mod collaborators;
#[cfg(feature = "config-toml")]
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod geo;
pub mod parser;
pub mod reaper;
pub mod reconstructor;
pub mod state_machine;
pub mod store;
pub mod writer;

pub use dispatcher::Dispatcher;
pub use error::{DrivelogError, Result};
pub use reaper::Reaper;
pub use reconstructor::{ReconstructionReport, Reconstructor, SegmentDiagnostic, SegmentOutcome};
pub use state_machine::StateMachine;
pub use writer::{EndTripInput, EndTripReason, TripWriter};

/// Common imports for downstream crates.
pub mod prelude {
    pub use crate::collaborators::{GeofenceStore, ReverseGeocoder, RoadSnapper, UpstreamProvider, VehicleStore};
    pub use crate::store::{ConnectionStore, EventStore, TripStore};
    pub use crate::{Dispatcher, DrivelogError, Reaper, Reconstructor, Result, StateMachine, TripWriter};
    pub use drivelog_types::prelude::*;
}

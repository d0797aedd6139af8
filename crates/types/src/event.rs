//! Canonical telemetry observations.
//!
//! A [`TelemetryEvent`] is the normalized output of the parser (see
//! `drivelog::parser`) and the unit the event store persists. It is
//! immutable and append-only once written.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Transmission position reported by the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShiftState {
    P,
    R,
    N,
    D,
    #[serde(rename = "SNA")]
    Sna,
}

impl ShiftState {
    /// `true` for gears that imply forward/reverse motion (`D`, `R`, `N`).
    pub fn is_driving(self) -> bool {
        matches!(self, ShiftState::D | ShiftState::R | ShiftState::N)
    }

    /// `true` for gears that imply the vehicle is stationary (`P`, `SNA`).
    pub fn is_parked(self) -> bool {
        matches!(self, ShiftState::P | ShiftState::Sna)
    }
}

/// Coarse connectivity/power state reported alongside telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    Online,
    Asleep,
    Offline,
}

impl VehicleState {
    /// `true` for states the state machine treats as "not reachable".
    pub fn is_offline(self) -> bool {
        matches!(self, VehicleState::Offline | VehicleState::Asleep)
    }
}

/// How an event reached the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Webhook,
    AutoFetch,
    StateOnly,
}

/// Speed as reported by the provider, kept in its original unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    KmH,
    Mph,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Speed {
    pub value: f64,
    pub unit: SpeedUnit,
}

/// Whatever of the original payload is worth keeping around for debugging.
///
/// Large payloads are summarized rather than stored verbatim, matching the
/// 24h-retention, append-only nature of the event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawPayload {
    Inline(serde_json::Value),
    Summary(String),
}

/// A single normalized telemetry observation for one VIN.
///
/// Immutable and append-only: nothing in this type is ever mutated after
/// `drivelog::parser` produces it and the event store appends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub id: Uuid,
    pub user_id: String,
    pub vin: String,
    pub created_at: SystemTime,
    pub source: EventSource,

    pub shift_state: Option<ShiftState>,
    pub speed: Option<Speed>,
    pub odometer_km: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub battery_level: Option<u8>,
    pub vehicle_state: Option<VehicleState>,

    pub processed: bool,
    pub raw_payload: Option<RawPayload>,
}

impl TelemetryEvent {
    pub fn has_gps(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// `true` when none of the measurement fields carry data — a pure
    /// keep-alive/poll event.
    pub fn is_state_only(&self) -> bool {
        !self.has_gps() && self.odometer_km.is_none() && self.shift_state.is_none()
    }

    pub fn lat_lon(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

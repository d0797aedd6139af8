//! Engine configuration: the tunable thresholds from spec §6.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the trip-detection engine. All fields have defaults
/// matching spec §6; override via `EngineConfig::builder()` or by
/// deserializing a TOML/env-sourced document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    #[serde(with = "duration_ms")]
    pub gps_silence: Duration,
    #[serde(with = "duration_ms")]
    pub stale_trip: Duration,
    #[serde(with = "duration_ms")]
    pub parked_confirmation: Duration,
    pub min_distance_km: f64,
    #[serde(with = "duration_ms")]
    pub event_retention: Duration,
    pub max_waypoints: usize,
    #[serde(with = "duration_ms")]
    pub dispatcher_interval: Duration,
    #[serde(with = "duration_ms")]
    pub reaper_interval: Duration,
    #[serde(with = "duration_ms")]
    pub retention_interval: Duration,
    /// Jitter filter threshold for starting a trip (spec §4.5, transition 5).
    pub trip_start_movement_meters: f64,
    /// Minimum movement before a waypoint is appended to a trip in progress
    /// (spec §4.5, transition 6).
    pub waypoint_movement_meters: f64,
    /// How long retryable storage errors may accumulate on an open trip
    /// before it is force-closed (spec §7).
    #[serde(with = "duration_ms")]
    pub error_timeout: Duration,
    pub dispatcher_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gps_silence: Duration::from_millis(180_000),
            stale_trip: Duration::from_millis(43_200_000),
            parked_confirmation: Duration::from_millis(120_000),
            min_distance_km: 0.1,
            event_retention: Duration::from_millis(86_400_000),
            max_waypoints: 2000,
            dispatcher_interval: Duration::from_millis(5_000),
            reaper_interval: Duration::from_millis(120_000),
            retention_interval: Duration::from_millis(3_600_000),
            trip_start_movement_meters: 30.0,
            waypoint_movement_meters: 15.0,
            error_timeout: Duration::from_millis(600_000),
            dispatcher_batch_size: 100,
        }
    }
}

/// Serialize/deserialize a `Duration` as whole milliseconds, matching the
/// `*_MS` naming the spec's configuration options use.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.gps_silence, Duration::from_secs(180));
        assert_eq!(cfg.stale_trip, Duration::from_secs(12 * 3600));
        assert_eq!(cfg.min_distance_km, 0.1);
        assert_eq!(cfg.max_waypoints, 2000);
    }

    #[test]
    fn roundtrips_through_json() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}

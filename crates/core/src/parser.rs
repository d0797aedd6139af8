//! Telemetry parser: canonicalizes heterogeneous provider payloads into a
//! [`TelemetryEvent`] (spec §4.2).
//!
//! Three payload shapes are accepted:
//! - **(a)** an array of `{key, value: {doubleValue|stringValue|intValue|
//!   floatValue|locationValue}}` tuples
//! - **(b)** an object keyed by numeric strings holding the same tuples,
//!   converted to shape (a) in key order
//! - **(c)** a flat object with directly-named fields
//!
//! Field resolution happens once, up front (`canonicalize_fields`), never by
//! re-inspecting the original payload shape in the per-field matchers below.

use crate::error::{DrivelogError, Result};
use chrono::DateTime;
use drivelog_types::{EventSource, ShiftState, Speed, SpeedUnit, TelemetryEvent, VehicleState};
use serde_json::Value;
use std::collections::HashMap;
use std::time::SystemTime;
use uuid::Uuid;

const MILES_TO_KM: f64 = 1.609344;

/// Parse a raw provider payload into a [`TelemetryEvent`].
///
/// Never panics; a malformed/incomplete payload yields `Err`, which the
/// caller (the ingestion endpoint) turns into `accepted: false` rather than
/// propagating.
pub fn parse(payload: &Value, user_id: &str, source: EventSource, now: SystemTime) -> Result<TelemetryEvent> {
    let vin = extract_vin(payload).ok_or_else(|| DrivelogError::InvalidInput("missing vin".into()))?;

    let fields = canonicalize_fields(payload);

    let shift_state = first(&fields, &["shiftstate", "gear"]).and_then(|v| v.as_str()).and_then(parse_shift_state);
    let speed = first(&fields, &["vehiclespeed", "speed"]).and_then(Value::as_f64).map(|value| Speed { value, unit: SpeedUnit::KmH });
    let odometer_km = first(&fields, &["odometerkm"])
        .and_then(Value::as_f64)
        .or_else(|| first(&fields, &["odometer", "odometermiles"]).and_then(Value::as_f64).map(|miles| miles * MILES_TO_KM))
        .filter(|km| *km > 0.0);
    let (latitude, longitude) = extract_location(&fields);
    let battery_level = first(&fields, &["batterylevel", "battery_level"]).and_then(Value::as_f64).map(|v| v.clamp(0.0, 100.0) as u8);

    let vehicle_state = extract_vehicle_state(payload);
    let created_at = extract_created_at(payload).unwrap_or(now);

    Ok(TelemetryEvent {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        vin,
        created_at,
        source,
        shift_state,
        speed,
        odometer_km,
        latitude,
        longitude,
        battery_level,
        vehicle_state,
        processed: false,
        raw_payload: Some(summarize_payload(payload)),
    })
}

/// Flatten shapes (a)/(b)/(c) into a single lowercase-keyed map of scalar
/// values. Unknown keys are carried through untouched and simply never
/// matched by a field resolver below.
fn canonicalize_fields(payload: &Value) -> HashMap<String, Value> {
    match payload {
        Value::Array(items) => tuples_to_map(items),
        Value::Object(map) => {
            if is_numeric_keyed(map) {
                let mut ordered: Vec<(u64, &Value)> = map
                    .iter()
                    .filter_map(|(k, v)| k.parse::<u64>().ok().map(|n| (n, v)))
                    .collect();
                ordered.sort_by_key(|(n, _)| *n);
                let items: Vec<Value> = ordered.into_iter().map(|(_, v)| v.clone()).collect();
                tuples_to_map(&items)
            } else {
                map.iter().map(|(k, v)| (k.to_lowercase(), v.clone())).collect()
            }
        }
        _ => HashMap::new(),
    }
}

fn is_numeric_keyed(map: &serde_json::Map<String, Value>) -> bool {
    map.keys().any(|k| k.parse::<u64>().is_ok())
}

fn tuples_to_map(items: &[Value]) -> HashMap<String, Value> {
    let mut out = HashMap::new();
    for item in items {
        let Some(key) = item.get("key").and_then(Value::as_str) else { continue };
        let Some(value) = item.get("value").and_then(extract_tuple_value) else { continue };
        out.insert(key.to_lowercase(), value);
    }
    out
}

fn extract_tuple_value(value: &Value) -> Option<Value> {
    for variant in ["doubleValue", "floatValue", "intValue", "stringValue", "locationValue"] {
        if let Some(v) = value.get(variant) {
            return Some(v.clone());
        }
    }
    None
}

fn first<'a>(fields: &'a HashMap<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| fields.get(*k))
}

fn extract_location(fields: &HashMap<String, Value>) -> (Option<f64>, Option<f64>) {
    if let Some(location) = first(fields, &["location"]) {
        let lat = location.get("latitude").and_then(Value::as_f64);
        let lon = location.get("longitude").and_then(Value::as_f64);
        if lat.is_some() || lon.is_some() {
            return (lat, lon);
        }
    }
    let lat = first(fields, &["location.latitude", "latitude"]).and_then(Value::as_f64);
    let lon = first(fields, &["location.longitude", "longitude"]).and_then(Value::as_f64);
    (lat, lon)
}

fn parse_shift_state(s: &str) -> Option<ShiftState> {
    match s.to_uppercase().as_str() {
        "P" => Some(ShiftState::P),
        "R" => Some(ShiftState::R),
        "N" => Some(ShiftState::N),
        "D" => Some(ShiftState::D),
        "SNA" => Some(ShiftState::Sna),
        _ => None,
    }
}

fn parse_vehicle_state(s: &str) -> Option<VehicleState> {
    match s.to_lowercase().as_str() {
        "online" => Some(VehicleState::Online),
        "asleep" => Some(VehicleState::Asleep),
        "offline" => Some(VehicleState::Offline),
        _ => None,
    }
}

/// Missing VIN ⇒ parse fails (spec §4.2).
fn extract_vin(payload: &Value) -> Option<String> {
    payload
        .get("vin")
        .or_else(|| payload.pointer("/vehicle/vin"))
        .or_else(|| payload.pointer("/metadata/vin"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn extract_vehicle_state(payload: &Value) -> Option<VehicleState> {
    payload
        .get("state")
        .or_else(|| payload.get("status"))
        .and_then(Value::as_str)
        .and_then(parse_vehicle_state)
}

fn extract_created_at(payload: &Value) -> Option<SystemTime> {
    let raw = payload.get("createdAt").or_else(|| payload.get("timestamp")).or_else(|| payload.get("created_at"))?;
    if let Some(millis) = raw.as_i64() {
        return Some(SystemTime::UNIX_EPOCH + std::time::Duration::from_millis(millis.unsigned_abs()));
    }
    if let Some(s) = raw.as_str() {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(SystemTime::from(dt));
        }
    }
    None
}

/// Keep the raw payload only if it's small; otherwise store a one-line
/// summary (spec §3: `rawPayload` retained only if small).
fn summarize_payload(payload: &Value) -> drivelog_types::event::RawPayload {
    const MAX_INLINE_BYTES: usize = 2048;
    let serialized = payload.to_string();
    if serialized.len() <= MAX_INLINE_BYTES {
        drivelog_types::event::RawPayload::Inline(payload.clone())
    } else {
        drivelog_types::event::RawPayload::Summary(format!("payload omitted ({} bytes)", serialized.len()))
    }
}

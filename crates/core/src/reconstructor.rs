//! On-demand trip reconstruction from raw telemetry history (spec §4.8).
//! Used to backfill trips after an outage, or to recover from a dispatcher
//! bug without replaying the live pipeline.

use crate::collaborators::{ReverseGeocoder, VehicleStore};
use crate::error::Result;
use crate::geo::haversine;
use crate::store::{EventStore, TripStore};
use crate::writer::{compute_distance_km, reconcile_odometer, EndTripInput, EndTripReason, TripWriter};
use chrono::{DateTime, Utc};
use drivelog_types::{TelemetryEvent, Trip, Waypoint, MIN_DISTANCE_KM};
use log::info;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const DRIVING_GPS_THRESHOLD_METERS: f64 = 50.0;
const DRIVING_ODOMETER_THRESHOLD_KM: f64 = 0.1;
const WAYPOINT_APPEND_METERS: f64 = 20.0;
const SEGMENT_CLOSE_GAP: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentOutcome {
    Persisted,
    DiscardedTooShort,
    Duplicate,
}

#[derive(Debug, Clone, Serialize)]
pub struct SegmentDiagnostic {
    pub start_time: String,
    pub end_time: String,
    pub distance_km: Option<f64>,
    pub max_speed_kmh: Option<f64>,
    pub outcome: SegmentOutcome,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ReconstructionReport {
    pub trips_created: usize,
    pub details: Vec<SegmentDiagnostic>,
}

struct Segment {
    start_time: SystemTime,
    end_time: SystemTime,
    last_driving_at: SystemTime,
    start_odo: Option<f64>,
    end_odo: Option<f64>,
    start_point: Option<(f64, f64)>,
    end_point: Option<(f64, f64)>,
    waypoints: Vec<Waypoint>,
    max_speed: Option<f64>,
}

fn fold_max_speed(current: Option<f64>, event: &TelemetryEvent) -> Option<f64> {
    match (current, event.speed.map(|s| s.value)) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (None, b) => b,
        (a, None) => a,
    }
}

fn is_driving_event(event: &TelemetryEvent, last_webhook_gps: Option<(f64, f64)>, last_odo: Option<f64>) -> bool {
    let offline = event.vehicle_state.map(|v| v.is_offline()).unwrap_or(false);
    let shift_driving = event.shift_state.map(|s| s.is_driving()).unwrap_or(false);
    let speed_null_or_zero = event.speed.map(|s| s.value == 0.0).unwrap_or(true);
    let stale_shift = shift_driving && offline && speed_null_or_zero;
    let shift_driving_not_stale = shift_driving && !stale_shift;

    let speed_positive = event.speed.map(|s| s.value > 0.0).unwrap_or(false);

    let gps_moved = match (last_webhook_gps, event.lat_lon()) {
        (Some((lat0, lon0)), Some((lat1, lon1))) => haversine(lat0, lon0, lat1, lon1) > DRIVING_GPS_THRESHOLD_METERS,
        _ => false,
    };

    let odo_advanced = match (event.odometer_km, last_odo) {
        (Some(cur), Some(prev)) => (cur - prev) > DRIVING_ODOMETER_THRESHOLD_KM,
        _ => false,
    };

    shift_driving_not_stale || speed_positive || gps_moved || odo_advanced
}

fn segment_events(events: &[TelemetryEvent]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current: Option<Segment> = None;
    let mut last_webhook_gps: Option<(f64, f64)> = None;
    let mut last_odo: Option<f64> = None;

    for event in events {
        let driving = is_driving_event(event, last_webhook_gps, last_odo);

        if driving {
            match current.as_mut() {
                Some(seg) => {
                    seg.end_time = event.created_at;
                    seg.last_driving_at = event.created_at;
                    seg.max_speed = fold_max_speed(seg.max_speed, event);
                    if let Some(odo) = event.odometer_km {
                        seg.end_odo = Some(odo);
                    }
                    if let Some(point) = event.lat_lon() {
                        seg.end_point = Some(point);
                        match seg.waypoints.last() {
                            Some(&(lat, lon)) if haversine(lat, lon, point.0, point.1) <= WAYPOINT_APPEND_METERS => {}
                            _ => seg.waypoints.push(point),
                        }
                    }
                }
                None => {
                    current = Some(Segment {
                        start_time: event.created_at,
                        end_time: event.created_at,
                        last_driving_at: event.created_at,
                        start_odo: event.odometer_km,
                        end_odo: event.odometer_km,
                        start_point: event.lat_lon(),
                        end_point: event.lat_lon(),
                        waypoints: event.lat_lon().into_iter().collect(),
                        max_speed: event.speed.map(|s| s.value),
                    });
                }
            }
        } else if let Some(seg) = current.as_ref() {
            let gap = event.created_at.duration_since(seg.last_driving_at).unwrap_or_default();
            if gap >= SEGMENT_CLOSE_GAP {
                segments.push(current.take().unwrap());
            }
            // else: tentatively extend — the segment stays open without
            // absorbing this non-driving event's data.
        }

        if event.source == drivelog_types::EventSource::Webhook {
            if let Some(point) = event.lat_lon() {
                last_webhook_gps = Some(point);
            }
        }
        if let Some(odo) = event.odometer_km {
            last_odo = Some(odo);
        }
    }

    if let Some(seg) = current.take() {
        segments.push(seg);
    }

    segments
}

fn format_rfc3339(t: SystemTime) -> String {
    DateTime::<Utc>::from(t).to_rfc3339()
}

fn parse_rfc3339(s: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc).into())
}

fn hh_mm(s: &str) -> Option<String> {
    parse_rfc3339(s).map(|t| DateTime::<Utc>::from(t).format("%H:%M").to_string())
}

fn ranges_overlap(a0: f64, a1: f64, b0: f64, b1: f64) -> bool {
    a0 <= b1 && b0 <= a1
}

fn is_duplicate(seg_start: SystemTime, seg_end: SystemTime, start_odo: f64, end_odo: f64, existing: &[Trip]) -> bool {
    let seg_hh_mm = DateTime::<Utc>::from(seg_start).format("%H:%M").to_string();

    existing.iter().any(|trip| {
        let same_start = trip.auto_logged && hh_mm(&trip.start_time).as_deref() == Some(seg_hh_mm.as_str());
        let odo_overlap = ranges_overlap(start_odo, end_odo, trip.start_odometer_km, trip.end_odometer_km);
        let time_overlap = match (parse_rfc3339(&trip.start_time), parse_rfc3339(&trip.end_time)) {
            (Some(ts), Some(te)) => seg_start <= te && ts <= seg_end,
            _ => false,
        };
        same_start || odo_overlap || time_overlap
    })
}

/// Replays a VIN's telemetry history into trip segments, grounded in the
/// same writer the live pipeline uses (spec §4.8 step 7 re-uses §4.6).
pub struct Reconstructor {
    event_store: Arc<dyn EventStore>,
    trip_store: Arc<dyn TripStore>,
    vehicle_store: Arc<dyn VehicleStore>,
    geocoder: Arc<dyn ReverseGeocoder>,
    writer: Arc<TripWriter>,
}

impl Reconstructor {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        trip_store: Arc<dyn TripStore>,
        vehicle_store: Arc<dyn VehicleStore>,
        geocoder: Arc<dyn ReverseGeocoder>,
        writer: Arc<TripWriter>,
    ) -> Self {
        Self {
            event_store,
            trip_store,
            vehicle_store,
            geocoder,
            writer,
        }
    }

    pub async fn reconstruct(&self, user_id: &str, vin: &str, since_hours: u64) -> Result<ReconstructionReport> {
        let since = SystemTime::now()
            .checked_sub(Duration::from_secs(since_hours * 3600))
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut events = self.event_store.list_by_vin(vin, since)?;
        if events.is_empty() {
            return Ok(ReconstructionReport::default());
        }
        events.sort_by_key(|e| (e.created_at, e.id));

        let vehicle = self.vehicle_store.find_by_vin(vin).await?;
        let vehicle_id = vehicle.as_ref().map(|v| v.id.clone()).unwrap_or_else(|| vin.to_string());
        let base_km = vehicle.as_ref().map(|v| v.current_odometer_km).unwrap_or(0.0);

        let segments = segment_events(&events);
        let mut report = ReconstructionReport::default();

        for seg in segments {
            let Some((distance_km, _source)) = compute_distance_km(seg.start_odo, seg.end_odo, seg.start_point, seg.end_point) else {
                report.details.push(SegmentDiagnostic {
                    start_time: format_rfc3339(seg.start_time),
                    end_time: format_rfc3339(seg.end_time),
                    distance_km: None,
                    max_speed_kmh: seg.max_speed,
                    outcome: SegmentOutcome::DiscardedTooShort,
                });
                continue;
            };

            if distance_km < MIN_DISTANCE_KM {
                report.details.push(SegmentDiagnostic {
                    start_time: format_rfc3339(seg.start_time),
                    end_time: format_rfc3339(seg.end_time),
                    distance_km: Some(distance_km),
                    max_speed_kmh: seg.max_speed,
                    outcome: SegmentOutcome::DiscardedTooShort,
                });
                continue;
            }

            let (start_odo, end_odo) = reconcile_odometer(seg.start_odo, seg.end_odo, distance_km, base_km);
            let date = DateTime::<Utc>::from(seg.start_time).date_naive();
            let existing = self.trip_store.list_by_vehicle_and_date(&vehicle_id, date)?;

            if is_duplicate(seg.start_time, seg.end_time, start_odo, end_odo, &existing) {
                report.details.push(SegmentDiagnostic {
                    start_time: format_rfc3339(seg.start_time),
                    end_time: format_rfc3339(seg.end_time),
                    distance_km: Some(distance_km),
                    max_speed_kmh: seg.max_speed,
                    outcome: SegmentOutcome::Duplicate,
                });
                continue;
            }

            let start_location = match seg.start_point {
                Some((lat, lon)) => self.geocoder.reverse_geocode(lat, lon).await.unwrap_or_else(|| format!("{lat},{lon}")),
                None => "Unknown".to_string(),
            };

            let input = EndTripInput {
                user_id: user_id.to_string(),
                vehicle_id: vehicle_id.clone(),
                reason: EndTripReason::Reconstructed,
                start_time: seg.start_time,
                start_odometer_km: seg.start_odo,
                start_latitude: seg.start_point.map(|p| p.0),
                start_longitude: seg.start_point.map(|p| p.1),
                start_location,
                end_time: seg.end_time,
                end_odometer_km: seg.end_odo,
                end_latitude: seg.end_point.map(|p| p.0),
                end_longitude: seg.end_point.map(|p| p.1),
                route_waypoints: seg.waypoints,
            };

            match self.writer.write(input).await? {
                Some(trip) => {
                    report.trips_created += 1;
                    report.details.push(SegmentDiagnostic {
                        start_time: format_rfc3339(seg.start_time),
                        end_time: format_rfc3339(seg.end_time),
                        distance_km: Some(trip.distance_km),
                        max_speed_kmh: seg.max_speed,
                        outcome: SegmentOutcome::Persisted,
                    });
                }
                None => report.details.push(SegmentDiagnostic {
                    start_time: format_rfc3339(seg.start_time),
                    end_time: format_rfc3339(seg.end_time),
                    distance_km: Some(distance_km),
                    max_speed_kmh: seg.max_speed,
                    outcome: SegmentOutcome::DiscardedTooShort,
                }),
            }
        }

        info!("reconstructed {} trip(s) for vin {vin} from {} event(s)", report.trips_created, events.len());
        Ok(report)
    }
}

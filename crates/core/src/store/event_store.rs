//! Append-only per-event storage with a `processed` flag and retention
//! (spec §4.3).
//!
//! Grounded in the teacher's `ColdState`/`AOFBackend` pattern: writes go to
//! the durable log first, then to an in-memory index ordered by
//! `(created_at, id)` so `list_unprocessed`/`list_by_vin` are cheap and
//! return a stable order suitable for per-VIN sorting.

use crate::error::Result;
use drivelog_types::TelemetryEvent;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::SystemTime;
use uuid::Uuid;

/// Ordering key for the event index: `(created_at, id)`, matching spec
/// §4.3's stable-order requirement.
type EventKey = (SystemTime, Uuid);

fn key_of(event: &TelemetryEvent) -> EventKey {
    (event.created_at, event.id)
}

pub trait EventStore: Send + Sync {
    fn append(&self, event: TelemetryEvent) -> Result<()>;
    fn list_unprocessed(&self, limit: usize) -> Result<Vec<TelemetryEvent>>;
    fn mark_processed(&self, ids: &[Uuid]) -> Result<()>;
    fn list_by_vin(&self, vin: &str, since: SystemTime) -> Result<Vec<TelemetryEvent>>;
    fn purge_older_than(&self, cutoff: SystemTime) -> Result<usize>;
}

/// Pure in-memory event store. Used directly by tests and by
/// `PersistentEventStore` as its hot index.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: Mutex<BTreeMap<EventKey, TelemetryEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, event: TelemetryEvent) {
        self.events.lock().insert(key_of(&event), event);
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, event: TelemetryEvent) -> Result<()> {
        self.insert(event);
        Ok(())
    }

    fn list_unprocessed(&self, limit: usize) -> Result<Vec<TelemetryEvent>> {
        Ok(self
            .events
            .lock()
            .values()
            .filter(|e| !e.processed)
            .take(limit)
            .cloned()
            .collect())
    }

    fn mark_processed(&self, ids: &[Uuid]) -> Result<()> {
        let wanted: std::collections::HashSet<&Uuid> = ids.iter().collect();
        let mut events = self.events.lock();
        for event in events.values_mut() {
            if wanted.contains(&event.id) {
                event.processed = true;
            }
        }
        Ok(())
    }

    fn list_by_vin(&self, vin: &str, since: SystemTime) -> Result<Vec<TelemetryEvent>> {
        Ok(self
            .events
            .lock()
            .values()
            .filter(|e| e.vin == vin && e.created_at >= since)
            .cloned()
            .collect())
    }

    fn purge_older_than(&self, cutoff: SystemTime) -> Result<usize> {
        let mut events = self.events.lock();
        let to_remove: Vec<EventKey> = events
            .range(..(cutoff, Uuid::nil()))
            .map(|(k, _)| *k)
            .collect();
        for key in &to_remove {
            events.remove(key);
        }
        Ok(to_remove.len())
    }
}

#[cfg(feature = "aof")]
mod persistent {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::io::{BufRead, BufReader, Write};
    use std::path::{Path, PathBuf};

    /// `InMemoryEventStore` backed by an append-only JSON-lines log,
    /// replayed on open — the same write-log-first-then-memory shape as the
    /// teacher's `AOFBackend::put`.
    pub struct PersistentEventStore {
        index: InMemoryEventStore,
        log_path: PathBuf,
        log: Mutex<File>,
    }

    impl PersistentEventStore {
        pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
            let log_path = path.as_ref().to_path_buf();
            let index = InMemoryEventStore::new();

            if log_path.exists() {
                let file = File::open(&log_path)?;
                for line in BufReader::new(file).lines() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let event: TelemetryEvent = serde_json::from_str(&line)?;
                    index.insert(event);
                }
            }

            let log = OpenOptions::new().create(true).append(true).open(&log_path)?;

            Ok(Self {
                index,
                log_path,
                log: Mutex::new(log),
            })
        }

        /// Rewrite the log from the current in-memory index, dropping
        /// processed/purged entries — analogous to an AOF rewrite.
        pub fn compact(&self) -> Result<()> {
            let events = self.index.events.lock();
            let temp_path = self.log_path.with_extension("log.tmp");
            {
                let mut temp = File::create(&temp_path)?;
                for event in events.values() {
                    writeln!(temp, "{}", serde_json::to_string(event)?)?;
                }
                temp.sync_all()?;
            }
            std::fs::rename(&temp_path, &self.log_path)?;
            let mut log = self.log.lock();
            *log = OpenOptions::new().create(true).append(true).open(&self.log_path)?;
            Ok(())
        }
    }

    impl EventStore for PersistentEventStore {
        fn append(&self, event: TelemetryEvent) -> Result<()> {
            {
                let mut log = self.log.lock();
                writeln!(log, "{}", serde_json::to_string(&event)?)?;
                log.flush()?;
            }
            self.index.insert(event);
            Ok(())
        }

        fn list_unprocessed(&self, limit: usize) -> Result<Vec<TelemetryEvent>> {
            self.index.list_unprocessed(limit)
        }

        fn mark_processed(&self, ids: &[Uuid]) -> Result<()> {
            self.index.mark_processed(ids)
        }

        fn list_by_vin(&self, vin: &str, since: SystemTime) -> Result<Vec<TelemetryEvent>> {
            self.index.list_by_vin(vin, since)
        }

        fn purge_older_than(&self, cutoff: SystemTime) -> Result<usize> {
            self.index.purge_older_than(cutoff)
        }
    }
}

#[cfg(feature = "aof")]
pub use persistent::PersistentEventStore;

#[cfg(test)]
mod tests {
    use super::*;
    use drivelog_types::EventSource;
    use std::time::Duration;

    fn event(vin: &str, created_at: SystemTime, processed: bool) -> TelemetryEvent {
        TelemetryEvent {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            vin: vin.into(),
            created_at,
            source: EventSource::Webhook,
            shift_state: None,
            speed: None,
            odometer_km: None,
            latitude: None,
            longitude: None,
            battery_level: None,
            vehicle_state: None,
            processed,
            raw_payload: None,
        }
    }

    #[test]
    fn list_unprocessed_respects_limit_and_flag() {
        let store = InMemoryEventStore::new();
        let now = SystemTime::now();
        for i in 0..5 {
            store.append(event("VIN1", now + Duration::from_secs(i), false)).unwrap();
        }
        let batch = store.list_unprocessed(3).unwrap();
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn mark_processed_excludes_from_future_listings() {
        let store = InMemoryEventStore::new();
        let e = event("VIN1", SystemTime::now(), false);
        let id = e.id;
        store.append(e).unwrap();
        store.mark_processed(&[id]).unwrap();
        assert!(store.list_unprocessed(10).unwrap().is_empty());
    }

    #[test]
    fn purge_older_than_removes_only_stale_events_p6() {
        let store = InMemoryEventStore::new();
        let now = SystemTime::now();
        let old = event("VIN1", now - Duration::from_secs(100), false);
        let fresh = event("VIN1", now, false);
        store.append(old).unwrap();
        store.append(fresh.clone()).unwrap();

        let removed = store.purge_older_than(now - Duration::from_secs(50)).unwrap();
        assert_eq!(removed, 1);

        let remaining = store.list_by_vin("VIN1", now - Duration::from_secs(1000)).unwrap();
        assert!(remaining.iter().all(|e| e.created_at >= now - Duration::from_secs(50)));
        assert!(remaining.iter().any(|e| e.id == fresh.id));
    }

    #[test]
    fn list_by_vin_filters_by_vin_and_since() {
        let store = InMemoryEventStore::new();
        let now = SystemTime::now();
        store.append(event("VIN1", now, false)).unwrap();
        store.append(event("VIN2", now, false)).unwrap();
        let results = store.list_by_vin("VIN1", now - Duration::from_secs(10)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].vin, "VIN1");
    }
}

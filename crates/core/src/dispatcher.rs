//! Per-VIN dispatcher (spec §4.4): drains unprocessed events in batches,
//! groups them by VIN, and replays each VIN's events through the
//! [`StateMachine`] in order.

use crate::collaborators::VehicleStore;
use crate::error::Result;
use crate::state_machine::StateMachine;
use crate::store::{ConnectionStore, EventStore};
use drivelog_types::{EngineConfig, TelemetryEvent};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Drains `listUnprocessed` on a timer and dispatches per VIN.
///
/// Grounded in the teacher's single-writer background dispatch loop: one
/// `AtomicBool` re-entrancy guard means an overrunning tick is simply
/// skipped rather than queued (spec §5).
pub struct Dispatcher {
    event_store: Arc<dyn EventStore>,
    connection_store: Arc<ConnectionStore>,
    vehicle_store: Arc<dyn VehicleStore>,
    state_machine: Arc<StateMachine>,
    config: EngineConfig,
    ticking: AtomicBool,
}

impl Dispatcher {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        connection_store: Arc<ConnectionStore>,
        vehicle_store: Arc<dyn VehicleStore>,
        state_machine: Arc<StateMachine>,
        config: EngineConfig,
    ) -> Self {
        Self {
            event_store,
            connection_store,
            vehicle_store,
            state_machine,
            config,
            ticking: AtomicBool::new(false),
        }
    }

    /// Run one dispatch tick. A no-op if a previous tick is still in
    /// flight.
    pub async fn tick(&self) -> Result<()> {
        if self.ticking.swap(true, Ordering::SeqCst) {
            debug!("dispatcher tick skipped: previous tick still running");
            return Ok(());
        }
        let result = self.run_tick().await;
        self.ticking.store(false, Ordering::SeqCst);
        result
    }

    async fn run_tick(&self) -> Result<()> {
        let events = self.event_store.list_unprocessed(self.config.dispatcher_batch_size)?;
        if events.is_empty() {
            return Ok(());
        }

        let mut by_vin: HashMap<String, Vec<TelemetryEvent>> = HashMap::new();
        for event in events {
            by_vin.entry(event.vin.clone()).or_default().push(event);
        }

        for (vin, mut events) in by_vin {
            events.sort_by_key(|e| (e.created_at, e.id));
            self.process_vin(&vin, events).await;
        }

        Ok(())
    }

    /// Resolve `vehicle_id` for `vin` via the vehicle store, falling back
    /// to the VIN itself when the vehicle hasn't been registered yet.
    async fn resolve_vehicle_id(&self, vin: &str) -> String {
        match self.vehicle_store.find_by_vin(vin).await {
            Ok(Some(vehicle)) => vehicle.id,
            Ok(None) => vin.to_string(),
            Err(e) => {
                warn!("vehicle lookup failed for vin {vin}: {e}");
                vin.to_string()
            }
        }
    }

    /// Process one VIN's events in order, committing the connection and
    /// marking each event processed as soon as it succeeds. Stops at the
    /// first failure, leaving the rest of this VIN's batch unprocessed for
    /// the next tick (spec §4.4).
    async fn process_vin(&self, vin: &str, events: Vec<TelemetryEvent>) {
        let Some(first) = events.first() else { return };
        let user_id = first.user_id.clone();
        let vehicle_id = self.resolve_vehicle_id(vin).await;
        let mut conn = self.connection_store.get_or_create(vin, &user_id, &vehicle_id);

        for event in events {
            match self.state_machine.process(&mut conn, &event).await {
                Ok(()) => {
                    self.connection_store.update(vin, &user_id, &vehicle_id, |c| *c = conn.clone());
                    if let Err(e) = self.event_store.mark_processed(&[event.id]) {
                        warn!("failed to mark event {} processed for vin {vin}: {e}", event.id);
                        break;
                    }
                }
                Err(e) => {
                    warn!("stopping dispatch for vin {vin} at event {}: {e}", event.id);
                    break;
                }
            }
        }
    }
}

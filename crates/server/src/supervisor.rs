//! Background loops wrapping the core's pure tick methods (spec §5): the
//! dispatcher drains unprocessed events, the reaper force-closes stale
//! trips and purges old events. Grounded in the teacher's
//! `transport/rpc.rs` `tokio::select!` accept loop, adapted from a
//! one-shot connection loop to a periodic-timer one.

use crate::state::AppState;
use drivelog_types::EngineConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Spawn the three supervised loops. Each stops as soon as `token` is
/// cancelled; callers `tokio::join!` the returned handles during shutdown.
pub fn spawn_all(state: Arc<AppState>, config: EngineConfig, token: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
    vec![
        tokio::spawn(dispatch_loop(state.clone(), config.dispatcher_interval, token.clone())),
        tokio::spawn(reaper_loop(state.clone(), config.reaper_interval, token.clone())),
        tokio::spawn(retention_loop(state, config.retention_interval, token)),
    ]
}

async fn dispatch_loop(state: Arc<AppState>, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("dispatcher loop shutting down");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = state.dispatcher.tick().await {
                    error!("dispatcher tick failed: {e}");
                }
            }
        }
    }
}

async fn reaper_loop(state: Arc<AppState>, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("reaper loop shutting down");
                return;
            }
            _ = ticker.tick() => {
                match state.reaper.sweep_trips().await {
                    Ok(closed) if closed > 0 => info!("reaper force-closed {closed} stale trip(s)"),
                    Ok(_) => {}
                    Err(e) => error!("reaper sweep failed: {e}"),
                }
            }
        }
    }
}

async fn retention_loop(state: Arc<AppState>, period: Duration, token: CancellationToken) {
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("retention loop shutting down");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = state.reaper.purge_expired_events().await {
                    error!("retention purge failed: {e}");
                }
            }
        }
    }
}

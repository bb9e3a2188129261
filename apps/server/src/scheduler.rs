//! Background scheduler for cache hygiene.
//!
//! Periodically drops cache entries too old to serve even as an emergency
//! fallback, so symbols nobody asks for anymore do not pile up.

use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use crate::main_lib::AppState;

/// Starts the background cache sweep.
pub fn start_cache_sweep_scheduler(state: Arc<AppState>, every: Duration) {
    tokio::spawn(async move {
        info!("Cache sweep scheduler started ({}s interval)", every.as_secs());

        let mut sweep_interval = interval(every);
        sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; nothing to sweep at startup
        sweep_interval.tick().await;

        loop {
            sweep_interval.tick().await;
            run_scheduled_sweep(&state);
        }
    });
}

fn run_scheduled_sweep(state: &AppState) {
    let removed = state.coordinator.sweep_cache();
    debug!(
        "Scheduled cache sweep removed {} entries, {} remain",
        removed,
        state.coordinator.status().cache_size
    );
}

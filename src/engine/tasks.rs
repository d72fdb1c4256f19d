use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::REFRESH_SUMMARY_EVERY;
use crate::db::load_table;
use crate::engine::Engine;
use crate::types::Tick;

/// Periodic compute loop. Never blocks ingestion: the store is only read.
pub async fn run_refresh(engine: Arc<Engine>, interval_ms: u64) {
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut passes: u64 = 0;

    loop {
        interval.tick().await;
        let summary = engine.refresh().await;
        passes += 1;
        if passes % REFRESH_SUMMARY_EVERY == 0 {
            let latency = engine.latency().summary();
            info!(
                instruments = summary.instruments,
                strength_samples = summary.strength_samples,
                oscillators_added = summary.oscillators_added,
                points_consumed = summary.points_consumed,
                p50_us = ?latency.p50_us,
                p99_us = ?latency.p99_us,
                "Refresh pass {passes}"
            );
        } else {
            debug!(?summary, "Refresh pass {passes}");
        }
    }
}

/// Reloads the persisted table on a fixed cadence so a finished `scan`
/// run reaches the live matcher without a restart.
pub async fn run_table_reload(engine: Arc<Engine>, pool: sqlx::SqlitePool, every_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(every_secs));
    interval.tick().await; // consume immediate first tick

    loop {
        interval.tick().await;
        match load_table(&pool).await {
            Ok(table) => {
                info!(rows = table.len(), "Probability table reloaded");
                engine.set_table(table).await;
            }
            Err(e) => error!("Table reload error: {e}"),
        }
    }
}

/// Drains the feed channel into the store. Rejected ticks are logged and
/// dropped; the feed keeps going.
pub async fn run_ingest(engine: Arc<Engine>, mut rx: mpsc::Receiver<Tick>) {
    while let Some(tick) = rx.recv().await {
        if let Err(e) = engine.ingest(&tick) {
            warn!(instrument = %tick.instrument, ts_ms = tick.ts_ms, "Tick rejected: {e}");
        }
    }
    info!("Tick feed closed");
}

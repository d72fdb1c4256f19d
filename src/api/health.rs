//! Shared health state for the /health endpoint.
//! Updated by the ingestion task, the refresh loop and the table reloader.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

/// Shared health counters. Written by engine tasks, read by the API.
#[derive(Debug, Default)]
pub struct HealthState {
    ticks_accepted: AtomicU64,
    ticks_rejected: AtomicU64,
    /// Feed timestamp of the last accepted tick (0 = none).
    last_tick_ts_ms: AtomicI64,
    /// Wall-clock time the last refresh pass finished (0 = none).
    last_refresh_at_ms: AtomicI64,
    table_rows: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub ticks_accepted: u64,
    pub ticks_rejected: u64,
    pub last_tick_ts_ms: Option<i64>,
    pub last_refresh_at_ms: Option<i64>,
    pub table_rows: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self, ts_ms: i64) {
        self.ticks_accepted.fetch_add(1, Ordering::Relaxed);
        self.last_tick_ts_ms.fetch_max(ts_ms, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.ticks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_last_refresh_at_ms(&self, ms: i64) {
        self.last_refresh_at_ms.store(ms, Ordering::Relaxed);
    }

    pub fn set_table_rows(&self, rows: u64) {
        self.table_rows.store(rows, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let nonzero = |v: i64| (v != 0).then_some(v);
        HealthSnapshot {
            ticks_accepted: self.ticks_accepted.load(Ordering::Relaxed),
            ticks_rejected: self.ticks_rejected.load(Ordering::Relaxed),
            last_tick_ts_ms: nonzero(self.last_tick_ts_ms.load(Ordering::Relaxed)),
            last_refresh_at_ms: nonzero(self.last_refresh_at_ms.load(Ordering::Relaxed)),
            table_rows: self.table_rows.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let health = HealthState::new();
        assert_eq!(health.snapshot().last_tick_ts_ms, None);

        health.record_accepted(2_000);
        health.record_accepted(1_000);
        health.record_rejected();
        health.set_table_rows(42);

        let snap = health.snapshot();
        assert_eq!(snap.ticks_accepted, 2);
        assert_eq!(snap.ticks_rejected, 1);
        assert_eq!(snap.last_tick_ts_ms, Some(2_000));
        assert_eq!(snap.table_rows, 42);
    }
}

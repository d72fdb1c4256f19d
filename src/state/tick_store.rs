use std::sync::Arc;

use dashmap::DashMap;

use crate::config::MAX_SERIES_POINTS;
use crate::error::{AppError, Result};
use crate::state::series::BoundedSeries;
use crate::types::{Tick, TimeSeriesPoint};

// ---------------------------------------------------------------------------
// TickHistoryStore
// ---------------------------------------------------------------------------

/// Per-instrument mid-price history.
///
/// Each instrument's series sits in its own map entry, so a write only locks
/// that entry's shard; there is no store-wide lock. Readers copy the series
/// out under the entry lock via `snapshot`.
pub struct TickHistoryStore {
    /// instrument → (ts, mid) series
    series: DashMap<String, BoundedSeries>,
    retention_ms: i64,
}

impl TickHistoryStore {
    pub fn new(retention_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            series: DashMap::new(),
            retention_ms,
        })
    }

    /// Append one quote as its mid price. Rejects non-positive or non-finite
    /// prices and timestamps that move the instrument's series backwards.
    pub fn add(&self, instrument: &str, ts_ms: i64, bid: f64, ask: f64) -> Result<TimeSeriesPoint> {
        if !bid.is_finite() || !ask.is_finite() || bid <= 0.0 || ask <= 0.0 {
            return Err(AppError::invalid(
                instrument,
                format!("bid/ask must be positive and finite (bid={bid}, ask={ask})"),
            ));
        }
        let point = TimeSeriesPoint::new(ts_ms, (bid + ask) / 2.0);

        let mut series = self
            .series
            .entry(instrument.to_string())
            .or_insert_with(|| BoundedSeries::new(self.retention_ms, MAX_SERIES_POINTS));
        series.push(point).map_err(|e| {
            AppError::invalid(
                instrument,
                format!("timestamp {} precedes last recorded {}", e.ts_ms, e.last_ts_ms),
            )
        })?;
        Ok(point)
    }

    pub fn add_tick(&self, tick: &Tick) -> Result<TimeSeriesPoint> {
        self.add(&tick.instrument, tick.ts_ms, tick.bid, tick.ask)
    }

    pub fn latest(&self, instrument: &str) -> Result<TimeSeriesPoint> {
        self.series
            .get(instrument)
            .and_then(|s| s.latest())
            .ok_or_else(|| AppError::NotAvailable(format!("no history for {instrument}")))
    }

    /// Latest sample not after `ts_ms`, or the earliest sample when history
    /// starts after `ts_ms`.
    pub fn at_or_before(&self, instrument: &str, ts_ms: i64) -> Result<TimeSeriesPoint> {
        self.series
            .get(instrument)
            .and_then(|s| s.at_or_before(ts_ms))
            .ok_or_else(|| AppError::NotAvailable(format!("no history for {instrument}")))
    }

    /// Copy of one instrument's series, oldest first.
    pub fn snapshot(&self, instrument: &str) -> Result<Vec<TimeSeriesPoint>> {
        self.read(instrument, BoundedSeries::snapshot)
    }

    /// Copy of the tail of one instrument's series from `since_ts_ms` on.
    pub fn snapshot_since(&self, instrument: &str, since_ts_ms: i64) -> Result<Vec<TimeSeriesPoint>> {
        self.read(instrument, |s| s.since(since_ts_ms))
    }

    /// Runs `f` on one instrument's series under its entry lock, without
    /// copying it. Keep `f` short: writers to that instrument wait on it.
    pub fn read<T>(&self, instrument: &str, f: impl FnOnce(&BoundedSeries) -> T) -> Result<T> {
        match self.series.get(instrument) {
            Some(s) if !s.is_empty() => Ok(f(s.value())),
            _ => Err(AppError::NotAvailable(format!("no history for {instrument}"))),
        }
    }

    /// Instruments currently tracked, sorted. The returned list can be
    /// iterated as often as needed; it does not hold any lock.
    pub fn known_instruments(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.series.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn instrument_count(&self) -> usize {
        self.series.len()
    }

    pub fn retention_ms(&self) -> i64 {
        self.retention_ms
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3_600_000;

    #[test]
    fn add_stores_mid_price() {
        let store = TickHistoryStore::new(HOUR);
        let p = store.add("EURUSD", 1_000, 1.0998, 1.1002).unwrap();
        assert!((p.value - 1.1).abs() < 1e-12);
        assert_eq!(store.latest("EURUSD").unwrap(), p);
    }

    #[test]
    fn malformed_quotes_are_invalid_input() {
        let store = TickHistoryStore::new(HOUR);
        for (bid, ask) in [(0.0, 1.0), (1.0, -1.0), (f64::NAN, 1.0), (1.0, f64::INFINITY)] {
            let err = store.add("EURUSD", 0, bid, ask).unwrap_err();
            assert!(matches!(err, AppError::InvalidInput { .. }), "{bid}/{ask}: {err}");
        }
        assert!(store.known_instruments().is_empty());
    }

    #[test]
    fn out_of_order_tick_is_rejected() {
        let store = TickHistoryStore::new(HOUR);
        store.add("EURUSD", 2_000, 1.1, 1.1).unwrap();
        assert!(matches!(
            store.add("EURUSD", 1_000, 1.2, 1.2),
            Err(AppError::InvalidInput { .. })
        ));
        assert_eq!(store.latest("EURUSD").unwrap().ts_ms, 2_000);
    }

    #[test]
    fn unknown_instrument_is_not_available() {
        let store = TickHistoryStore::new(HOUR);
        assert!(matches!(store.latest("GBPUSD"), Err(AppError::NotAvailable(_))));
        assert!(matches!(store.at_or_before("GBPUSD", 0), Err(AppError::NotAvailable(_))));
        assert!(matches!(store.snapshot("GBPUSD"), Err(AppError::NotAvailable(_))));
    }

    #[test]
    fn tail_and_in_place_reads() {
        let store = TickHistoryStore::new(HOUR);
        for (ts, mid) in [(1_000, 1.1), (2_000, 1.2), (3_000, 1.3)] {
            store.add("EURUSD", ts, mid, mid).unwrap();
        }
        let tail = store.snapshot_since("EURUSD", 2_000).unwrap();
        assert_eq!(tail.iter().map(|p| p.ts_ms).collect::<Vec<_>>(), vec![2_000, 3_000]);
        assert_eq!(store.read("EURUSD", |s| s.len()).unwrap(), 3);
        assert!(matches!(store.read("GBPUSD", |s| s.len()), Err(AppError::NotAvailable(_))));
    }

    #[test]
    fn at_or_before_falls_back_to_earliest_sample() {
        let store = TickHistoryStore::new(HOUR);
        store.add("EURUSD", 10_000, 1.1, 1.1).unwrap();
        store.add("EURUSD", 20_000, 1.2, 1.2).unwrap();
        assert_eq!(store.at_or_before("EURUSD", 0).unwrap().ts_ms, 10_000);
        assert_eq!(store.at_or_before("EURUSD", 15_000).unwrap().ts_ms, 10_000);
    }

    #[test]
    fn instruments_do_not_interfere_and_listing_is_restartable() {
        let store = TickHistoryStore::new(HOUR);
        store.add("GBPUSD", 5_000, 1.3, 1.3).unwrap();
        store.add("EURUSD", 1_000, 1.1, 1.1).unwrap();
        // EURUSD's clock does not constrain GBPUSD
        store.add("GBPUSD", 6_000, 1.3, 1.3).unwrap();

        let ids = store.known_instruments();
        assert_eq!(ids, vec!["EURUSD".to_string(), "GBPUSD".to_string()]);
        assert_eq!(ids.iter().count(), ids.iter().count());
    }

    #[test]
    fn history_is_bounded_by_retention() {
        let store = TickHistoryStore::new(HOUR);
        for minute in 0..=180 {
            store.add("EURUSD", minute * 60_000, 1.1, 1.1).unwrap();
        }
        let snap = store.snapshot("EURUSD").unwrap();
        assert_eq!(snap.first().unwrap().ts_ms, 120 * 60_000);
        assert_eq!(snap.len(), 61);
    }

    #[test]
    fn concurrent_writers_on_different_instruments() {
        let store = TickHistoryStore::new(HOUR);
        let handles: Vec<_> = ["EURUSD", "GBPUSD", "USDJPY", "AUDUSD"]
            .into_iter()
            .map(|sym| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..1_000 {
                        store.add(sym, i, 1.0, 1.0).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.instrument_count(), 4);
        assert_eq!(store.snapshot("USDJPY").unwrap().len(), 1_000);
    }
}

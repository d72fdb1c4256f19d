use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use crate::config::MAX_SERIES_POINTS;
use crate::error::{AppError, Result};
use crate::state::BoundedSeries;
use crate::types::{PercentChangeResult, TimeSeriesPoint};

/// Key of one strength series: (currency, window label).
pub type StrengthKey = (String, String);

/// Bounded history of currency-strength samples, one series per
/// (currency, window label). Same lookup contract as the tick store.
pub struct StrengthSeriesFeed {
    series: DashMap<StrengthKey, BoundedSeries>,
    retention_ms: i64,
}

impl StrengthSeriesFeed {
    pub fn new(retention_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            series: DashMap::new(),
            retention_ms,
        })
    }

    /// Appends one sample per (currency, label) present in `strengths`.
    /// Returns how many samples were recorded.
    pub fn record(&self, ts_ms: i64, strengths: &BTreeMap<String, PercentChangeResult>) -> usize {
        let mut recorded = 0;
        for (currency, result) in strengths {
            for change in &result.changes {
                let mut series = self
                    .series
                    .entry((currency.clone(), change.label.clone()))
                    .or_insert_with(|| BoundedSeries::new(self.retention_ms, MAX_SERIES_POINTS));
                match series.push(TimeSeriesPoint::new(ts_ms, change.pct)) {
                    Ok(()) => recorded += 1,
                    Err(e) => warn!(
                        currency = %currency,
                        window = %change.label,
                        "strength sample at {} precedes last recorded {}",
                        e.ts_ms,
                        e.last_ts_ms,
                    ),
                }
            }
        }
        recorded
    }

    pub fn latest(&self, currency: &str, label: &str) -> Result<TimeSeriesPoint> {
        self.get(currency, label, |s| s.latest())
    }

    pub fn at_or_before(&self, currency: &str, label: &str, ts_ms: i64) -> Result<TimeSeriesPoint> {
        self.get(currency, label, |s| s.at_or_before(ts_ms))
    }

    pub fn snapshot(&self, currency: &str, label: &str) -> Result<Vec<TimeSeriesPoint>> {
        self.get(currency, label, |s| (!s.is_empty()).then(|| s.snapshot()))
    }

    /// Samples at or after `since_ts_ms`; `Ok` only when the series exists
    /// and is non-empty, even if the tail itself is empty.
    pub fn snapshot_since(&self, currency: &str, label: &str, since_ts_ms: i64) -> Result<Vec<TimeSeriesPoint>> {
        self.get(currency, label, |s| (!s.is_empty()).then(|| s.since(since_ts_ms)))
    }

    /// Tracked (currency, label) keys, sorted.
    pub fn known_series(&self) -> Vec<StrengthKey> {
        let mut keys: Vec<StrengthKey> = self.series.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    fn get<T>(&self, currency: &str, label: &str, f: impl FnOnce(&BoundedSeries) -> Option<T>) -> Result<T> {
        self.series
            .get(&(currency.to_string(), label.to_string()))
            .and_then(|s| f(&s))
            .ok_or_else(|| AppError::NotAvailable(format!("no strength history for {currency} {label}")))
    }
}

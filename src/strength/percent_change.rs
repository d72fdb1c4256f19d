use std::sync::Arc;

use crate::state::series::at_or_before;
use crate::state::TickHistoryStore;
use crate::types::{PercentChangeResult, TimeSeriesPoint, WindowSpec};

/// Percent change of an instrument's mid price over each configured window,
/// measured from the latest sample back to the sample at-or-before
/// `latest.ts - window`.
pub struct PercentChangeCalculator {
    store: Arc<TickHistoryStore>,
    windows: Vec<WindowSpec>,
}

impl PercentChangeCalculator {
    pub fn new(store: Arc<TickHistoryStore>, windows: Vec<WindowSpec>) -> Self {
        Self { store, windows }
    }

    pub fn windows(&self) -> &[WindowSpec] {
        &self.windows
    }

    /// Unknown instruments yield an empty result rather than an error.
    /// Lookups run against the live series, so nothing is copied.
    pub fn compute(&self, instrument: &str) -> PercentChangeResult {
        self.store
            .read(instrument, |series| match series.latest() {
                Some(current) => changes_from(current, |ts| series.at_or_before(ts), &self.windows),
                None => PercentChangeResult::default(),
            })
            .unwrap_or_default()
    }
}

/// Pure form of `PercentChangeCalculator::compute` over one snapshot.
///
/// A label is omitted when the reference sample is missing, is zero, or is
/// the current sample itself (no elapsed history to measure against).
pub fn percent_changes(points: &[TimeSeriesPoint], windows: &[WindowSpec]) -> PercentChangeResult {
    match points.last() {
        Some(current) => changes_from(*current, |ts| at_or_before(points, ts), windows),
        None => PercentChangeResult::default(),
    }
}

fn changes_from(
    current: TimeSeriesPoint,
    lookup: impl Fn(i64) -> Option<TimeSeriesPoint>,
    windows: &[WindowSpec],
) -> PercentChangeResult {
    let mut result = PercentChangeResult::default();
    for window in windows {
        let Some(reference) = lookup(current.ts_ms - window.length_ms) else {
            continue;
        };
        if reference.ts_ms >= current.ts_ms || reference.value == 0.0 {
            continue;
        }
        let pct = (current.value - reference.value) / reference.value * 100.0;
        result.insert(&window.label, pct);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: i64 = 60_000;

    fn windows(labels: &[&str]) -> Vec<WindowSpec> {
        labels.iter().map(|l| WindowSpec::parse(l).unwrap()).collect()
    }

    #[test]
    fn fifteen_minute_change_on_eurusd() {
        let store = TickHistoryStore::new(25 * 60 * MIN);
        store.add("EURUSD", 0, 1.1000, 1.1000).unwrap();
        store.add("EURUSD", 15 * MIN, 1.1011, 1.1011).unwrap();

        let calc = PercentChangeCalculator::new(store, windows(&["15m"]));
        let pct = calc.compute("EURUSD").get("15m").unwrap();
        assert!((pct - 0.1).abs() < 1e-9, "pct={pct}");
    }

    #[test]
    fn reference_uses_sample_at_or_before_window_start() {
        let points = vec![
            TimeSeriesPoint::new(0, 100.0),
            TimeSeriesPoint::new(50 * MIN, 110.0),
            TimeSeriesPoint::new(70 * MIN, 121.0),
        ];
        // 1h back from 70m is 10m → sample at 0
        let r = percent_changes(&points, &windows(&["1h"]));
        assert!((r.get("1h").unwrap() - 21.0).abs() < 1e-9);
        // 15m back from 70m is 55m → sample at 50m
        let r = percent_changes(&points, &windows(&["15m"]));
        assert!((r.get("15m").unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn short_history_degrades_to_earliest_sample() {
        let points = vec![TimeSeriesPoint::new(0, 100.0), TimeSeriesPoint::new(30 * MIN, 101.0)];
        let r = percent_changes(&points, &windows(&["24h"]));
        assert!((r.get("24h").unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_reference_is_omitted_not_zero_filled() {
        let store = TickHistoryStore::new(60 * MIN);
        let calc = PercentChangeCalculator::new(store.clone(), windows(&["15m", "1h"]));
        assert!(calc.compute("EURUSD").is_empty());

        // A single sample has nothing to compare against.
        store.add("EURUSD", 0, 1.1, 1.1).unwrap();
        let r = calc.compute("EURUSD");
        assert_eq!(r.get("15m"), None);
        assert_eq!(r.get("1h"), None);
    }

    #[test]
    fn zero_reference_is_omitted() {
        let points = vec![TimeSeriesPoint::new(0, 0.0), TimeSeriesPoint::new(MIN, 1.0)];
        assert!(percent_changes(&points, &windows(&["1m"])).is_empty());
    }

    #[test]
    fn labels_follow_configured_order() {
        let points = vec![TimeSeriesPoint::new(0, 1.0), TimeSeriesPoint::new(5 * 60 * MIN, 2.0)];
        let r = percent_changes(&points, &windows(&["4h", "15m", "1h"]));
        let labels: Vec<_> = r.changes.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["4h", "15m", "1h"]);
    }
}

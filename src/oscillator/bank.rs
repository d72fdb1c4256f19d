use serde::{Deserialize, Serialize};

use crate::oscillator::{OscillatorKind, OscillatorOutput, OscillatorState, Thresholds};
use crate::types::TimeSeriesPoint;

/// Which series an oscillator consumes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SeriesSource {
    /// Mid prices of one instrument.
    Price { instrument: String },
    /// Strength of one currency over one window label.
    Strength { currency: String, window: String },
    /// Strength(base) - Strength(quote), aligned by timestamp.
    Differential { base: String, quote: String, window: String },
}

impl std::fmt::Display for SeriesSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeriesSource::Price { instrument } => write!(f, "price:{instrument}"),
            SeriesSource::Strength { currency, window } => write!(f, "strength:{currency}:{window}"),
            SeriesSource::Differential { base, quote, window } => {
                write!(f, "diff:{base}-{quote}:{window}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatorSpec {
    pub source: SeriesSource,
    pub kind: OscillatorKind,
    pub thresholds: Thresholds,
}

impl OscillatorSpec {
    pub fn label(&self) -> String {
        format!("{} {}", self.kind, self.source)
    }
}

/// Resolves a source to a consistent snapshot of its points, oldest first.
/// With `since_ts_ms`, only points at or after it are needed; returning
/// more is allowed. `None` when the source has no history yet.
pub trait SeriesProvider {
    fn series(&self, source: &SeriesSource, since_ts_ms: Option<i64>) -> Option<Vec<TimeSeriesPoint>>;
}

/// How far into its source an entry has read: the last timestamp folded in
/// and how many points carrying that timestamp were folded.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    ts_ms: i64,
    at_ts: usize,
}

impl Cursor {
    /// Index of the first unread point. Points at the cursor timestamp are
    /// kept in arrival order, so the read ones are the first `at_ts` of them.
    fn resume(&self, points: &[TimeSeriesPoint]) -> usize {
        let first = points.partition_point(|p| p.ts_ms < self.ts_ms);
        let past = points.partition_point(|p| p.ts_ms <= self.ts_ms);
        (first + self.at_ts).min(past)
    }

    fn advance(cursor: Option<Cursor>, ts_ms: i64) -> Cursor {
        match cursor {
            Some(c) if c.ts_ms == ts_ms => Cursor { ts_ms, at_ts: c.at_ts + 1 },
            _ => Cursor { ts_ms, at_ts: 1 },
        }
    }
}

#[derive(Debug, Clone)]
struct BankEntry {
    spec: OscillatorSpec,
    state: OscillatorState,
    cursor: Option<Cursor>,
    output: OscillatorOutput,
}

/// Set of independent oscillator instances.
///
/// On `refresh` each entry pulls the tail of its source from its cursor on
/// and folds in only the points it has not consumed yet. A point arriving
/// with the same timestamp as the last consumed one is still folded in.
#[derive(Debug, Default)]
pub struct OscillatorBank {
    entries: Vec<BankEntry>,
}

impl OscillatorBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the spec unless an identical one is already present.
    /// Returns true when a new entry was created.
    pub fn ensure(&mut self, spec: OscillatorSpec) -> bool {
        if self.entries.iter().any(|e| e.spec == spec) {
            return false;
        }
        let state = OscillatorState::new(spec.kind);
        let output = state.insufficient();
        self.entries.push(BankEntry {
            spec,
            state,
            cursor: None,
            output,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of points consumed across all entries.
    pub fn refresh(&mut self, provider: &impl SeriesProvider) -> usize {
        let mut consumed = 0;
        for entry in &mut self.entries {
            let since = entry.cursor.map(|c| c.ts_ms);
            let Some(points) = provider.series(&entry.spec.source, since) else {
                continue;
            };
            let start = entry.cursor.map_or(0, |c| c.resume(&points));
            for point in &points[start..] {
                entry.output = entry.state.update(*point, &entry.spec.thresholds);
                entry.cursor = Some(Cursor::advance(entry.cursor, point.ts_ms));
                consumed += 1;
            }
        }
        consumed
    }

    pub fn readings(&self) -> Vec<(OscillatorSpec, OscillatorOutput)> {
        self.entries
            .iter()
            .map(|e| (e.spec.clone(), e.output))
            .collect()
    }

    pub fn reading(&self, source: &SeriesSource, kind: OscillatorKind) -> Option<OscillatorOutput> {
        self.entries
            .iter()
            .find(|e| &e.spec.source == source && e.spec.kind == kind)
            .map(|e| e.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oscillator::differential::align_difference;
    use crate::oscillator::Zone;
    use std::collections::HashMap;

    const BANDS: Thresholds = Thresholds { overbought: 70.0, oversold: 30.0 };

    #[derive(Default)]
    struct MapProvider(HashMap<SeriesSource, Vec<TimeSeriesPoint>>);

    impl SeriesProvider for MapProvider {
        fn series(&self, source: &SeriesSource, since_ts_ms: Option<i64>) -> Option<Vec<TimeSeriesPoint>> {
            let points = if let SeriesSource::Differential { base, quote, window } = source {
                let b = self.0.get(&strength(base, window))?;
                let q = self.0.get(&strength(quote, window))?;
                align_difference(b, q)
            } else {
                self.0.get(source).cloned()?
            };
            let since = since_ts_ms.unwrap_or(i64::MIN);
            Some(points.into_iter().filter(|p| p.ts_ms >= since).collect())
        }
    }

    fn strength(currency: &str, window: &str) -> SeriesSource {
        SeriesSource::Strength { currency: currency.to_string(), window: window.to_string() }
    }

    fn ramp(n: i64, f: impl Fn(i64) -> f64) -> Vec<TimeSeriesPoint> {
        (0..n).map(|t| TimeSeriesPoint::new(t, f(t))).collect()
    }

    #[test]
    fn refresh_consumes_only_new_points() {
        let src = strength("EUR", "1h");
        let mut provider = MapProvider::default();
        provider.0.insert(src.clone(), ramp(10, |t| t as f64));

        let mut bank = OscillatorBank::new();
        bank.ensure(OscillatorSpec { source: src.clone(), kind: OscillatorKind::ZScore { window: 5 }, thresholds: BANDS });
        assert_eq!(bank.refresh(&provider), 10);
        assert_eq!(bank.refresh(&provider), 0);

        provider.0.insert(src, ramp(12, |t| t as f64));
        assert_eq!(bank.refresh(&provider), 2);
    }

    #[test]
    fn same_timestamp_write_after_refresh_is_folded_in() {
        let src = SeriesSource::Price { instrument: "EURUSD".into() };
        let kind = OscillatorKind::ZScore { window: 3 };
        let mut provider = MapProvider::default();
        provider.0.insert(src.clone(), vec![
            TimeSeriesPoint::new(1, 1.0),
            TimeSeriesPoint::new(2, 2.0),
            TimeSeriesPoint::new(3, 3.0),
        ]);

        let mut bank = OscillatorBank::new();
        bank.ensure(OscillatorSpec { source: src.clone(), kind, thresholds: BANDS });
        assert_eq!(bank.refresh(&provider), 3);
        assert!(bank.reading(&src, kind).unwrap().reading().unwrap().value > 0.0);

        // a later quote at the same instant supersedes 3.0
        provider.0.get_mut(&src).unwrap().push(TimeSeriesPoint::new(3, 0.5));
        assert_eq!(bank.refresh(&provider), 1);
        let r = *bank.reading(&src, kind).unwrap().reading().unwrap();
        assert_eq!(r.ts_ms, 3);
        assert!(r.value < 0.0);
        assert_eq!(bank.refresh(&provider), 0);

        // older points pruned from the front do not shift the cursor
        provider.0.insert(src.clone(), vec![
            TimeSeriesPoint::new(3, 3.0),
            TimeSeriesPoint::new(3, 0.5),
            TimeSeriesPoint::new(4, 4.0),
        ]);
        assert_eq!(bank.refresh(&provider), 1);
        assert_eq!(bank.reading(&src, kind).unwrap().reading().unwrap().ts_ms, 4);
    }

    #[test]
    fn entries_over_the_same_series_do_not_share_state() {
        let src = strength("USD", "1h");
        let mut provider = MapProvider::default();
        provider.0.insert(src.clone(), ramp(30, |t| (t % 3) as f64));

        let mut bank = OscillatorBank::new();
        bank.ensure(OscillatorSpec { source: src.clone(), kind: OscillatorKind::Rsi { period: 14 }, thresholds: BANDS });
        bank.refresh(&provider);
        let first = bank.reading(&src, OscillatorKind::Rsi { period: 14 }).unwrap();

        // A second, identical-kind RSI with a different period starts cold.
        bank.ensure(OscillatorSpec { source: src.clone(), kind: OscillatorKind::Rsi { period: 5 }, thresholds: BANDS });
        assert!(!bank.ensure(OscillatorSpec { source: src.clone(), kind: OscillatorKind::Rsi { period: 5 }, thresholds: BANDS }));
        assert!(matches!(
            bank.reading(&src, OscillatorKind::Rsi { period: 5 }),
            Some(OscillatorOutput::Insufficient { have: 0, need: 6 })
        ));
        bank.refresh(&provider);
        assert_eq!(bank.reading(&src, OscillatorKind::Rsi { period: 14 }), Some(first));
        assert!(bank.reading(&src, OscillatorKind::Rsi { period: 5 }).unwrap().reading().is_some());
    }

    #[test]
    fn differential_mode_tracks_base_minus_quote() {
        let mut provider = MapProvider::default();
        provider.0.insert(strength("EUR", "1h"), ramp(20, |t| t as f64 * 0.1));
        provider.0.insert(strength("USD", "1h"), ramp(20, |t| -(t as f64) * 0.1));

        let diff = SeriesSource::Differential { base: "EUR".into(), quote: "USD".into(), window: "1h".into() };
        let mut bank = OscillatorBank::new();
        bank.ensure(OscillatorSpec { source: diff.clone(), kind: OscillatorKind::PercentRank { window: 10 }, thresholds: BANDS });
        bank.refresh(&provider);

        let r = *bank.reading(&diff, OscillatorKind::PercentRank { window: 10 }).unwrap().reading().unwrap();
        // EUR rising while USD falls: the spread is at the top of its range.
        assert_eq!(r.value, 100.0);
        assert_eq!(r.zone, Zone::Overbought);
        assert_eq!(r.ts_ms, 19);
    }

    #[test]
    fn missing_source_stays_insufficient() {
        let provider = MapProvider::default();
        let mut bank = OscillatorBank::new();
        let src = strength("NZD", "1h");
        bank.ensure(OscillatorSpec { source: src.clone(), kind: OscillatorKind::ZScore { window: 20 }, thresholds: BANDS });
        bank.refresh(&provider);
        assert_eq!(
            bank.reading(&src, OscillatorKind::ZScore { window: 20 }),
            Some(OscillatorOutput::Insufficient { have: 0, need: 20 })
        );
    }
}

use std::sync::Arc;

use serde::Serialize;

use crate::config::{Config, PipSizes};
use crate::scanner::grid::{detect_burst, priority_order, Burst, TriggerSpec};
use crate::scanner::{ProbabilityRow, ProbabilityTable, StateKey, StateKeySpec};
use crate::state::{BoundedSeries, TickHistoryStore};
use crate::types::{Direction, TimeSeriesPoint, MINUTE_MS};

#[derive(Debug, Clone)]
pub struct EdgeConfig {
    /// Evaluated in this order; see `priority_order`.
    pub triggers: Vec<TriggerSpec>,
    pub state_key: StateKeySpec,
    pub n_min: u64,
    pub pip_sizes: PipSizes,
    /// See `TriggerSpec::spans_window`.
    pub burst_gap_ms: i64,
}

impl EdgeConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            triggers: priority_order(&cfg.triggers),
            state_key: cfg.state_key,
            n_min: cfg.n_min,
            pip_sizes: cfg.pip_sizes.clone(),
            burst_gap_ms: cfg.burst_gap_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeReading {
    pub trigger_label: String,
    pub direction: Direction,
    pub move_pips: f64,
    /// State at the current bar.
    pub state_key: StateKey,
    /// Whether `row.state_key` equals `state_key` rather than a coarser prefix.
    pub exact_state: bool,
    pub row: ProbabilityRow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NoMatchReason {
    NoHistory,
    NoTrigger,
    NoRows,
    /// Rows exist, but none reaches `n_min` samples.
    InsufficientSample { best_total: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EdgeMatch {
    Matched(EdgeReading),
    NoMatch(NoMatchReason),
}

/// Looks for a just-fired burst on the live store and the historical
/// probability row that best describes it. Never mutates the table.
pub struct LiveEdgeMatcher {
    store: Arc<TickHistoryStore>,
    table: Arc<ProbabilityTable>,
    cfg: EdgeConfig,
}

impl LiveEdgeMatcher {
    pub fn new(store: Arc<TickHistoryStore>, table: Arc<ProbabilityTable>, cfg: EdgeConfig) -> Self {
        Self { store, table, cfg }
    }

    pub fn table(&self) -> &Arc<ProbabilityTable> {
        &self.table
    }

    /// Same matcher over a newer table.
    pub fn with_table(&self, table: Arc<ProbabilityTable>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            table,
            cfg: self.cfg.clone(),
        }
    }

    /// Fired triggers are tried in priority order. For each, rows are
    /// searched from the exact state key down to the empty key; within one
    /// level the largest sample wins, and rows under `n_min` never match.
    pub fn match_instrument(&self, instrument: &str) -> EdgeMatch {
        let pip = self.cfg.pip_sizes.pip_size(instrument);
        let lookback = self.cfg.state_key.lookback_minutes();
        // Only the closes the state key needs leave the entry lock.
        let read = self.store.read(instrument, |series| {
            let fired = self.fired(series, pip);
            let closes = if fired.is_empty() {
                Vec::new()
            } else {
                recent_minute_closes(series.iter(), lookback)
            };
            (fired, closes)
        });
        let Ok((fired, closes)) = read else {
            return EdgeMatch::NoMatch(NoMatchReason::NoHistory);
        };
        if fired.is_empty() {
            return EdgeMatch::NoMatch(NoMatchReason::NoTrigger);
        }

        let state = self.cfg.state_key.compute(&closes);
        let levels = state.prefixes();
        let mut best_total: Option<u64> = None;

        for burst in fired {
            let label = burst.trigger.label();
            let candidates = self.table.candidates(instrument, &label, burst.direction);

            for (level, key) in levels.iter().enumerate() {
                let at_level: Vec<&ProbabilityRow> =
                    candidates.iter().copied().filter(|r| &r.state_key == key).collect();
                if let Some(max) = at_level.iter().map(|r| r.total).max() {
                    best_total = Some(best_total.map_or(max, |b| b.max(max)));
                }
                let winner = at_level
                    .into_iter()
                    .filter(|r| r.total >= self.cfg.n_min)
                    .max_by(|a, b| {
                        a.total
                            .cmp(&b.total)
                            .then(a.probability.total_cmp(&b.probability))
                    });
                if let Some(row) = winner {
                    return EdgeMatch::Matched(EdgeReading {
                        trigger_label: label,
                        direction: burst.direction,
                        move_pips: burst.move_pips,
                        state_key: state.clone(),
                        exact_state: level == 0,
                        row: row.clone(),
                    });
                }
            }
        }

        match best_total {
            Some(best_total) => EdgeMatch::NoMatch(NoMatchReason::InsufficientSample { best_total }),
            None => EdgeMatch::NoMatch(NoMatchReason::NoRows),
        }
    }

    /// Same comparison as the scanner: latest mid against the mid at-or-before
    /// `now - W`, only when history reaches back that far and that mid is no
    /// older than `W` plus the gap tolerance. After a feed outage the first
    /// ticks therefore fire nothing until a fresh reference exists.
    fn fired(&self, series: &BoundedSeries, pip: f64) -> Vec<Burst> {
        let Some(current) = series.latest() else {
            return Vec::new();
        };
        self.cfg
            .triggers
            .iter()
            .filter_map(|trigger| {
                let reference = series.covered_at_or_before(current.ts_ms - trigger.window_ms())?;
                if !trigger.spans_window(current.ts_ms - reference.ts_ms, self.cfg.burst_gap_ms) {
                    return None;
                }
                detect_burst(current.value, reference.value, pip, trigger)
            })
            .collect()
    }
}

/// Last value in each 1-minute bucket, oldest first. Minutes without
/// samples are absent, as in bar history.
pub fn minute_closes(points: &[TimeSeriesPoint]) -> Vec<f64> {
    recent_minute_closes(points.iter(), usize::MAX)
}

/// The newest `max_minutes` entries of `minute_closes`, walking back from
/// the end so older history is never visited.
fn recent_minute_closes<'a>(
    points: impl DoubleEndedIterator<Item = &'a TimeSeriesPoint>,
    max_minutes: usize,
) -> Vec<f64> {
    let mut closes: Vec<f64> = Vec::new();
    let mut current_bucket: Option<i64> = None;
    for p in points.rev() {
        let bucket = p.ts_ms.div_euclid(MINUTE_MS);
        if current_bucket == Some(bucket) {
            continue;
        }
        if closes.len() == max_minutes {
            break;
        }
        closes.push(p.value);
        current_bucket = Some(bucket);
    }
    closes.reverse();
    closes
}

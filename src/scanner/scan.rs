use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::config::{Config, SCAN_CANCEL_CHECK_BARS};
use crate::error::{AppError, Result};
use crate::scanner::grid::{detect_burst, target_reached, Burst, OutcomeSpec, TriggerSpec};
use crate::scanner::state_key::{StateKey, StateKeySpec};
use crate::scanner::table::{Counts, ProbabilityRow, RowKey};
use crate::types::{Bar, Direction};

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub triggers: Vec<TriggerSpec>,
    pub outcomes: Vec<OutcomeSpec>,
    pub state_key: StateKeySpec,
    pub laplace_alpha: f64,
    /// See `TriggerSpec::spans_window`.
    pub burst_gap_ms: i64,
    /// Also accumulate every coarser prefix of the state key.
    pub emit_relaxed: bool,
}

impl ScanConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            triggers: cfg.triggers.clone(),
            outcomes: cfg.outcomes.clone(),
            state_key: cfg.state_key,
            laplace_alpha: cfg.laplace_alpha,
            burst_gap_ms: cfg.burst_gap_ms,
            emit_relaxed: true,
        }
    }
}

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Completed scan of one instrument.
#[derive(Debug, Clone)]
pub struct InstrumentScan {
    pub symbol: String,
    pub bars: usize,
    pub triggers_fired: u64,
    pub counts: BTreeMap<RowKey, Counts>,
}

impl InstrumentScan {
    pub fn into_rows(self, alpha: f64) -> Vec<ProbabilityRow> {
        let symbol = self.symbol;
        self.counts
            .into_iter()
            .map(|(key, counts)| ProbabilityRow::new(&symbol, key, counts, alpha))
            .collect()
    }
}

/// Empirical P(outcome | burst, state) from historical 1-minute bars.
///
/// For every bar `i` and trigger `(M, W)`, the close at `i` is compared with
/// the close of the bar at-or-before `time[i] - W`. When the move is at least
/// `M` pips, every outcome `(K, T)` checks whether the most favourable
/// high/low over bars `i+1 ..= k_end` (last bar not after `time[i] + T`)
/// reaches `K` pips beyond `close[i]`. Lookbacks before the first bar and
/// horizons past the last bar are skipped, not counted. So is a reference
/// bar further back than `W` plus the gap tolerance: across a weekend the
/// first bars of the session would otherwise compare against the previous
/// session's close.
///
/// The state key and the trigger at `i` only ever see `bars[..=i]`.
///
/// Triggers are not deduplicated: a sustained move fires on consecutive
/// bars and those samples overlap in their forward windows, so the counts
/// are serially correlated. Callers that need independent samples should
/// thin the bars or the fired events themselves.
pub struct ConditionalProbabilityScanner {
    cfg: ScanConfig,
    trigger_labels: Vec<String>,
    outcome_labels: Vec<String>,
}

impl ConditionalProbabilityScanner {
    pub fn new(cfg: ScanConfig) -> Self {
        let trigger_labels = cfg.triggers.iter().map(|t| t.label()).collect();
        let outcome_labels = cfg.outcomes.iter().map(|o| o.label()).collect();
        Self {
            cfg,
            trigger_labels,
            outcome_labels,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.cfg
    }

    /// Rejects non-increasing timestamps and non-finite or non-positive
    /// prices, naming the first offending bar.
    pub fn validate(symbol: &str, bars: &[Bar]) -> Result<()> {
        for (i, bar) in bars.iter().enumerate() {
            let prices = [bar.open, bar.high, bar.low, bar.close];
            if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
                return Err(AppError::ScanAborted {
                    symbol: symbol.to_string(),
                    index: i,
                    reason: format!("bad OHLC {prices:?}"),
                });
            }
            if i > 0 && bar.ts_ms <= bars[i - 1].ts_ms {
                return Err(AppError::ScanAborted {
                    symbol: symbol.to_string(),
                    index: i,
                    reason: format!("timestamp {} not after {}", bar.ts_ms, bars[i - 1].ts_ms),
                });
            }
        }
        Ok(())
    }

    /// Triggers firing at bar `i`, with the state key at `i`.
    /// Reads nothing past `bars[i]`.
    pub fn triggers_at(&self, bars: &[Bar], i: usize, pip: f64) -> Vec<(Burst, StateKey)> {
        let head = &bars[..=i];
        let ts: Vec<i64> = head.iter().map(|b| b.ts_ms).collect();
        let closes: Vec<f64> = head.iter().map(|b| b.close).collect();
        let fired = self.fired(&ts, &closes, i, pip);
        if fired.is_empty() {
            return Vec::new();
        }
        let state = self.cfg.state_key.compute(&closes);
        fired.into_iter().map(|(_, b)| (b, state.clone())).collect()
    }

    fn fired(&self, ts: &[i64], closes: &[f64], i: usize, pip: f64) -> Vec<(usize, Burst)> {
        let mut out = Vec::new();
        for (t_idx, trigger) in self.cfg.triggers.iter().enumerate() {
            let target = ts[i] - trigger.window_ms();
            let Some(j) = ts[..i].partition_point(|&t| t <= target).checked_sub(1) else {
                continue;
            };
            if !trigger.spans_window(ts[i] - ts[j], self.cfg.burst_gap_ms) {
                continue;
            }
            if let Some(burst) = detect_burst(closes[i], closes[j], pip, trigger) {
                out.push((t_idx, burst));
            }
        }
        out
    }

    pub fn scan_instrument(&self, symbol: &str, bars: &[Bar], pip: f64, cancel: &CancelFlag) -> Result<InstrumentScan> {
        Self::validate(symbol, bars)?;

        let started = Instant::now();
        let ts: Vec<i64> = bars.iter().map(|b| b.ts_ms).collect();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mut counts: BTreeMap<RowKey, Counts> = BTreeMap::new();
        let mut triggers_fired = 0u64;

        let Some(&last_ts) = ts.last() else {
            return Ok(InstrumentScan {
                symbol: symbol.to_string(),
                bars: 0,
                triggers_fired,
                counts,
            });
        };

        for i in 0..bars.len() {
            if i % SCAN_CANCEL_CHECK_BARS == 0 && cancel.is_cancelled() {
                return Err(AppError::Cancelled(symbol.to_string()));
            }

            let fired = self.fired(&ts, &closes, i, pip);
            if fired.is_empty() {
                continue;
            }
            let state = self.cfg.state_key.compute(&closes[..=i]);
            let states = if self.cfg.emit_relaxed { state.prefixes() } else { vec![state] };

            // (max high, min low) over the forward window, per outcome
            let mut extremes: Vec<Option<Option<(f64, f64)>>> = vec![None; self.cfg.outcomes.len()];

            for (t_idx, burst) in fired {
                triggers_fired += 1;
                for (o_idx, outcome) in self.cfg.outcomes.iter().enumerate() {
                    let range = *extremes[o_idx].get_or_insert_with(|| {
                        forward_extremes(bars, &ts, i, last_ts, outcome)
                    });
                    let Some((max_high, min_low)) = range else {
                        continue;
                    };
                    let excursion = match burst.direction {
                        Direction::Up => max_high - closes[i],
                        Direction::Down => closes[i] - min_low,
                    };
                    let success = target_reached(excursion / pip, outcome);

                    for state in &states {
                        let c = counts
                            .entry(RowKey {
                                trigger_label: self.trigger_labels[t_idx].clone(),
                                outcome_label: self.outcome_labels[o_idx].clone(),
                                direction: burst.direction,
                                state_key: state.clone(),
                            })
                            .or_default();
                        c.total += 1;
                        c.successes += u64::from(success);
                    }
                }
            }
        }

        info!(
            symbol = %symbol,
            bars = bars.len(),
            triggers_fired,
            cells = counts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scan complete"
        );

        Ok(InstrumentScan {
            symbol: symbol.to_string(),
            bars: bars.len(),
            triggers_fired,
            counts,
        })
    }
}

/// `None` when the horizon runs past the data or holds no bar after `i`.
fn forward_extremes(bars: &[Bar], ts: &[i64], i: usize, last_ts: i64, outcome: &OutcomeSpec) -> Option<(f64, f64)> {
    let horizon = ts[i] + outcome.horizon_ms();
    if horizon > last_ts {
        return None;
    }
    let k_end = ts.partition_point(|&t| t <= horizon) - 1;
    if k_end <= i {
        return None;
    }
    let window = &bars[i + 1..=k_end];
    let max_high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
    let min_low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
    Some((max_high, min_low))
}

/// Input for one instrument in a parallel scan.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub symbol: String,
    pub bars: Vec<Bar>,
    pub pip: f64,
}

/// Scans instruments concurrently on the blocking pool. Each instrument
/// succeeds or fails on its own; a cancelled flag stops instruments that
/// have not started and interrupts running ones at the next check.
pub async fn scan_parallel(
    scanner: Arc<ConditionalProbabilityScanner>,
    jobs: Vec<ScanJob>,
    cancel: CancelFlag,
) -> Vec<(String, Result<InstrumentScan>)> {
    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let scanner = Arc::clone(&scanner);
            let cancel = cancel.clone();
            let symbol = job.symbol.clone();
            let handle = tokio::task::spawn_blocking(move || {
                if cancel.is_cancelled() {
                    return Err(AppError::Cancelled(job.symbol.clone()));
                }
                scanner.scan_instrument(&job.symbol, &job.bars, job.pip, &cancel)
            });
            (symbol, handle)
        })
        .collect();

    let (symbols, handles): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
    let results = futures_util::future::join_all(handles).await;

    symbols
        .into_iter()
        .zip(results)
        .map(|(symbol, joined)| {
            let result = joined.map_err(AppError::from).and_then(|r| r);
            if let Err(e) = &result {
                warn!(symbol = %symbol, "instrument scan discarded: {e}");
            }
            (symbol, result)
        })
        .collect()
}

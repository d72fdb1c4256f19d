//! The live engine: one shared handle over the tick store, derived
//! strength series, oscillator bank and edge matcher.

pub mod tasks;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::{Config, OscillatorParams};
use crate::edge::{EdgeConfig, EdgeMatch, LiveEdgeMatcher};
use crate::error::Result;
use crate::oscillator::differential::align_difference;
use crate::oscillator::{
    OscillatorBank, OscillatorKind, OscillatorOutput, OscillatorSpec, SeriesProvider, SeriesSource, Thresholds,
};
use crate::scanner::ProbabilityTable;
use crate::state::TickHistoryStore;
use crate::strength::{PercentChangeCalculator, StrengthAggregator, StrengthSeriesFeed};
use crate::types::{now_ms, split_pair, PercentChangeResult, Tick, TimeSeriesPoint, WindowSpec};

/// Latest output of one bank entry, as published to readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OscillatorSnapshot {
    pub label: String,
    pub source: SeriesSource,
    pub kind: OscillatorKind,
    pub output: OscillatorOutput,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub instruments: usize,
    pub strength_samples: usize,
    pub oscillators_added: usize,
    pub points_consumed: usize,
    pub edges_matched: usize,
}

pub struct Engine {
    store: Arc<TickHistoryStore>,
    calculator: Arc<PercentChangeCalculator>,
    aggregator: StrengthAggregator,
    strength: Arc<StrengthSeriesFeed>,
    osc: OscillatorParams,
    bank: Mutex<OscillatorBank>,
    readings: DashMap<String, OscillatorSnapshot>,
    /// Last edge result per instrument from the refresh loop.
    edges: DashMap<String, EdgeMatch>,
    matcher: RwLock<Arc<LiveEdgeMatcher>>,
    /// Data time of the last strength sample.
    last_strength_ts: AtomicI64,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
}

impl Engine {
    pub fn new(cfg: &Config, table: ProbabilityTable) -> Result<Arc<Self>> {
        let retention_ms = cfg.retention_ms();
        let store = TickHistoryStore::new(retention_ms);
        let calculator = Arc::new(PercentChangeCalculator::new(Arc::clone(&store), cfg.windows.clone()));
        let aggregator = StrengthAggregator::new(Arc::clone(&calculator), cfg.currencies.clone());

        let health = Arc::new(HealthState::new());
        health.set_table_rows(table.len() as u64);
        let matcher = LiveEdgeMatcher::new(Arc::clone(&store), Arc::new(table), EdgeConfig::from_config(cfg));

        Ok(Arc::new(Self {
            store,
            calculator,
            aggregator,
            strength: StrengthSeriesFeed::new(retention_ms),
            osc: cfg.oscillators.clone(),
            bank: Mutex::new(OscillatorBank::new()),
            readings: DashMap::new(),
            edges: DashMap::new(),
            matcher: RwLock::new(Arc::new(matcher)),
            last_strength_ts: AtomicI64::new(i64::MIN),
            health,
            latency: Arc::new(LatencyStats::new()?),
        }))
    }

    pub fn store(&self) -> &Arc<TickHistoryStore> {
        &self.store
    }

    pub fn windows(&self) -> &[WindowSpec] {
        self.calculator.windows()
    }

    pub fn strength_feed(&self) -> &Arc<StrengthSeriesFeed> {
        &self.strength
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    pub fn latency(&self) -> &Arc<LatencyStats> {
        &self.latency
    }

    /// Appends one tick; rejections are counted and returned to the caller.
    pub fn ingest(&self, tick: &Tick) -> Result<TimeSeriesPoint> {
        match self.store.add_tick(tick) {
            Ok(point) => {
                self.health.record_accepted(point.ts_ms);
                Ok(point)
            }
            Err(e) => {
                self.health.record_rejected();
                Err(e)
            }
        }
    }

    /// `NotAvailable` for an instrument that never ticked.
    pub fn percent_change(&self, instrument: &str) -> Result<PercentChangeResult> {
        self.store.latest(instrument)?;
        Ok(self.calculator.compute(instrument))
    }

    /// Strength of every tracked currency, computed now.
    pub fn strength(&self) -> BTreeMap<String, PercentChangeResult> {
        let instruments = self.store.known_instruments();
        self.aggregator.compute_all(instruments.iter().map(String::as_str))
    }

    /// Published oscillator outputs, sorted by label.
    pub fn oscillators(&self) -> Vec<OscillatorSnapshot> {
        let mut out: Vec<OscillatorSnapshot> = self.readings.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.label.cmp(&b.label));
        out
    }

    /// Edge results from the last refresh pass, sorted by instrument.
    pub fn latest_edges(&self) -> Vec<(String, EdgeMatch)> {
        let mut out: Vec<(String, EdgeMatch)> =
            self.edges.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub async fn edge(&self, instrument: &str) -> EdgeMatch {
        let matcher = Arc::clone(&*self.matcher.read().await);
        matcher.match_instrument(instrument)
    }

    pub async fn table(&self) -> Arc<ProbabilityTable> {
        Arc::clone(self.matcher.read().await.table())
    }

    /// Swaps in a newly loaded table. In-flight lookups keep the old one.
    pub async fn set_table(&self, table: ProbabilityTable) {
        self.health.set_table_rows(table.len() as u64);
        let mut matcher = self.matcher.write().await;
        let next = Arc::new(matcher.with_table(Arc::new(table)));
        *matcher = next;
    }

    /// One pass of the periodic compute: sample strength when the data time
    /// advanced, register oscillators for new series, feed the bank, then
    /// evaluate every instrument against the table. A match is logged once
    /// per (trigger, direction) run.
    pub async fn refresh(&self) -> RefreshSummary {
        let started = Instant::now();
        let instruments = self.store.known_instruments();
        let mut summary = RefreshSummary {
            instruments: instruments.len(),
            ..RefreshSummary::default()
        };

        let data_ts = instruments
            .iter()
            .filter_map(|id| self.store.latest(id).ok())
            .map(|p| p.ts_ms)
            .max();
        if let Some(ts) = data_ts {
            if ts > self.last_strength_ts.load(Ordering::Relaxed) {
                let strengths = self.aggregator.compute_all(instruments.iter().map(String::as_str));
                summary.strength_samples = self.strength.record(ts, &strengths);
                self.last_strength_ts.store(ts, Ordering::Relaxed);
            }
        }

        {
            let mut bank = self.bank.lock().await;
            for spec in self.oscillator_specs(&instruments) {
                if bank.ensure(spec) {
                    summary.oscillators_added += 1;
                }
            }
            summary.points_consumed = bank.refresh(self);
            for (spec, output) in bank.readings() {
                let label = spec.label();
                self.readings.insert(
                    label.clone(),
                    OscillatorSnapshot {
                        label,
                        source: spec.source,
                        kind: spec.kind,
                        output,
                    },
                );
            }
        }

        let matcher = Arc::clone(&*self.matcher.read().await);
        for id in &instruments {
            let result = matcher.match_instrument(id);
            if let EdgeMatch::Matched(m) = &result {
                summary.edges_matched += 1;
                let repeat = matches!(
                    self.edges.get(id).as_deref(),
                    Some(EdgeMatch::Matched(prev))
                        if prev.trigger_label == m.trigger_label && prev.direction == m.direction
                );
                if !repeat {
                    info!(
                        instrument = %id,
                        trigger = %m.trigger_label,
                        direction = %m.direction,
                        outcome = %m.row.outcome_label,
                        state = %m.row.state_key,
                        probability = m.row.probability,
                        total = m.row.total,
                        "Edge matched"
                    );
                }
            }
            self.edges.insert(id.clone(), result);
        }

        self.latency.record(started.elapsed());
        self.health.set_last_refresh_at_ms(now_ms());
        summary
    }

    /// Every oscillator the current instrument set calls for: each
    /// transform over each tracked currency's strength, each pair's price
    /// and each pair's strength differential.
    fn oscillator_specs(&self, instruments: &[String]) -> Vec<OscillatorSpec> {
        let window = &self.osc.osc_window;
        let currencies = self.aggregator.currencies();
        let mut sources: Vec<SeriesSource> = currencies
            .iter()
            .map(|c| SeriesSource::Strength {
                currency: c.clone(),
                window: window.clone(),
            })
            .collect();
        for id in instruments {
            let Some((base, quote)) = split_pair(id) else {
                continue;
            };
            if !currencies.contains(&base) || !currencies.contains(&quote) {
                continue;
            }
            sources.push(SeriesSource::Price { instrument: id.clone() });
            sources.push(SeriesSource::Differential {
                base,
                quote,
                window: window.clone(),
            });
        }

        let bounded = self.osc.thresholds;
        let band = Thresholds {
            overbought: self.osc.zscore_band,
            oversold: -self.osc.zscore_band,
        };
        let kinds = [
            (OscillatorKind::Rsi { period: self.osc.rsi_period }, bounded),
            (
                OscillatorKind::Stochastic {
                    k_period: self.osc.stoch_k,
                    d_period: self.osc.stoch_d,
                },
                bounded,
            ),
            (OscillatorKind::ZScore { window: self.osc.zscore_window }, band),
            (OscillatorKind::PercentRank { window: self.osc.prank_window }, bounded),
        ];

        sources
            .into_iter()
            .flat_map(|source| {
                kinds.iter().map(move |(kind, thresholds)| OscillatorSpec {
                    source: source.clone(),
                    kind: *kind,
                    thresholds: *thresholds,
                })
            })
            .collect()
    }
}

/// Hands the bank only the tail it has not read yet; a fresh entry gets the
/// whole retained series.
impl SeriesProvider for Engine {
    fn series(&self, source: &SeriesSource, since_ts_ms: Option<i64>) -> Option<Vec<TimeSeriesPoint>> {
        let since = since_ts_ms.unwrap_or(i64::MIN);
        match source {
            SeriesSource::Price { instrument } => self.store.snapshot_since(instrument, since).ok(),
            SeriesSource::Strength { currency, window } => {
                self.strength.snapshot_since(currency, window, since).ok()
            }
            SeriesSource::Differential { base, quote, window } => {
                let base = self.strength.snapshot_since(base, window, since).ok()?;
                let quote = self.strength.snapshot_since(quote, window, since).ok()?;
                let diff = align_difference(&base, &quote);
                (!diff.is_empty()).then_some(diff)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::NoMatchReason;
    use crate::error::AppError;
    use crate::scanner::{Counts, ProbabilityRow, RowKey, StateKey};
    use crate::types::{Direction, MINUTE_MS};

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "CURRENCIES" => Some("EUR,USD,JPY".to_string()),
            "WINDOWS" => Some("15m,1h".to_string()),
            "RSI_PERIOD" => Some("3".to_string()),
            "STATE_RSI_PERIOD" => Some("0".to_string()),
            "STATE_VOL_WINDOWS" => Some(String::new()),
            "N_MIN" => Some("10".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn tick(instrument: &str, ts_ms: i64, mid: f64) -> Tick {
        Tick {
            instrument: instrument.to_string(),
            bid: mid,
            ask: mid,
            ts_ms,
        }
    }

    #[tokio::test]
    async fn ingest_counts_accepted_and_rejected_ticks() {
        let engine = Engine::new(&config(), ProbabilityTable::default()).unwrap();
        engine.ingest(&tick("EURUSD", 1_000, 1.1)).unwrap();
        assert!(engine.ingest(&tick("EURUSD", 500, 1.1)).is_err());
        assert!(engine.ingest(&tick("EURUSD", 2_000, -1.0)).is_err());

        let health = engine.health().snapshot();
        assert_eq!(health.ticks_accepted, 1);
        assert_eq!(health.ticks_rejected, 2);
        assert_eq!(health.last_tick_ts_ms, Some(1_000));
    }

    #[tokio::test]
    async fn refresh_samples_strength_once_per_data_time() {
        let engine = Engine::new(&config(), ProbabilityTable::default()).unwrap();
        for m in 0..=60 {
            let ts = m * MINUTE_MS;
            engine.ingest(&tick("EURUSD", ts, 1.1000 + m as f64 * 0.0001)).unwrap();
            engine.ingest(&tick("USDJPY", ts, 150.0)).unwrap();
            engine.refresh().await;
        }

        // First tick has no reference yet, so samples start at minute 1.
        let eur = engine.strength_feed().snapshot("EUR", "1h").unwrap();
        assert_eq!(eur.len(), 60);
        assert!(eur.last().unwrap().value > 0.0);

        // No new data: nothing recorded.
        let summary = engine.refresh().await;
        assert_eq!(summary.strength_samples, 0);
        assert_eq!(engine.strength_feed().snapshot("EUR", "1h").unwrap().len(), 60);
        assert!(engine.health().snapshot().last_refresh_at_ms.is_some());
        assert_eq!(engine.latency().summary().samples, 62);
    }

    #[tokio::test]
    async fn oscillators_cover_strength_price_and_differential() {
        let engine = Engine::new(&config(), ProbabilityTable::default()).unwrap();
        for m in 0..=30 {
            let ts = m * MINUTE_MS;
            engine.ingest(&tick("EURUSD", ts, 1.1000 + m as f64 * 0.0001)).unwrap();
            engine.ingest(&tick("USDJPY", ts, 150.0 - m as f64 * 0.01)).unwrap();
            engine.ingest(&tick("XAUUSD", ts, 2_000.0)).unwrap();
            engine.refresh().await;
        }

        let readings = engine.oscillators();
        // 3 currencies + 2 tracked pairs x (price, differential) = 7 sources, 4 transforms each.
        assert_eq!(readings.len(), 28);
        assert!(readings.iter().all(|r| !r.label.contains("XAU")));

        let rsi_eur = readings
            .iter()
            .find(|r| r.label == "rsi(3) strength:EUR:1h")
            .unwrap();
        let reading = rsi_eur.output.reading().unwrap();
        assert!(reading.value > 50.0);

        let prank_diff = readings
            .iter()
            .find(|r| r.label == "prank(50) diff:EUR-USD:1h")
            .unwrap();
        assert!(matches!(prank_diff.output, OscillatorOutput::Insufficient { need: 50, .. }));
    }

    #[tokio::test]
    async fn lookups_for_unknown_instruments() {
        let engine = Engine::new(&config(), ProbabilityTable::default()).unwrap();
        assert!(matches!(engine.percent_change("EURUSD"), Err(AppError::NotAvailable(_))));
        assert_eq!(engine.edge("EURUSD").await, EdgeMatch::NoMatch(NoMatchReason::NoHistory));
    }

    #[tokio::test]
    async fn table_swap_is_visible_to_the_matcher() {
        let engine = Engine::new(&config(), ProbabilityTable::default()).unwrap();
        for m in 0..=20 {
            let mid = if m <= 10 { 1.1000 } else { 1.1000 + 0.0002 * (m - 10) as f64 };
            engine.ingest(&tick("EURUSD", m * MINUTE_MS, mid)).unwrap();
        }
        assert_eq!(engine.edge("EURUSD").await, EdgeMatch::NoMatch(NoMatchReason::NoRows));

        let row = ProbabilityRow::new(
            "EURUSD",
            RowKey::new("M20_W15", "K15_T60", Direction::Up, StateKey::empty()),
            Counts::new(30, 50),
            1.0,
        );
        engine.set_table(ProbabilityTable::new(vec![row])).await;
        assert_eq!(engine.health().snapshot().table_rows, 1);
        assert_eq!(engine.table().await.len(), 1);

        let EdgeMatch::Matched(m) = engine.edge("EURUSD").await else {
            panic!("expected a match");
        };
        assert_eq!(m.trigger_label, "M20_W15");

        let summary = engine.refresh().await;
        assert_eq!(summary.edges_matched, 1);
        let edges = engine.latest_edges();
        assert_eq!(edges.len(), 1);
        assert!(matches!(edges[0].1, EdgeMatch::Matched(_)));
    }
}

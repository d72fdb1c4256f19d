use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{AppError, Result};
use crate::oscillator::Thresholds;
use crate::scanner::grid::{OutcomeSpec, TriggerSpec};
use crate::scanner::state_key::StateKeySpec;
use crate::types::{WindowSpec, MINUTE_MS};

/// Channel capacity between the feed reader and the ingestion task.
pub const CHANNEL_CAPACITY: usize = 4096;

/// Hard cap on points per bounded series, independent of retention.
pub const MAX_SERIES_POINTS: usize = 200_000;

/// Refresh passes between info-level summaries.
pub const REFRESH_SUMMARY_EVERY: u64 = 60;

/// Bars between cooperative cancellation checks inside one instrument scan.
pub const SCAN_CANCEL_CHECK_BARS: usize = 4096;

/// Tolerance when comparing pip distances against grid thresholds,
/// so that an exact 10-pip move is not lost to float representation.
pub const PIP_EPSILON: f64 = 1e-6;

/// Pip size used for JPY-quoted pairs unless overridden.
pub const JPY_PIP: f64 = 0.01;
pub const DEFAULT_PIP: f64 = 0.0001;

/// Sample-size bands for derived confidence tiers.
pub mod confidence_tiers {
    pub const MEDIUM_MIN: u64 = 100;
    pub const HIGH_MIN: u64 = 500;
}

/// Volatility regime ratio bands (short stdev / long stdev).
pub mod vol_regime {
    pub const LOW_MAX: f64 = 0.8;
    pub const HIGH_MIN: f64 = 1.25;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscillatorParams {
    /// Strength window label whose series feeds the bank.
    pub osc_window: String,
    pub rsi_period: usize,
    pub stoch_k: usize,
    pub stoch_d: usize,
    pub zscore_window: usize,
    pub prank_window: usize,
    /// Bounded oscillators (RSI, %K, %Rank).
    pub thresholds: Thresholds,
    /// Z-score classifies as overbought above +band, oversold below -band.
    pub zscore_band: f64,
}

/// Per-symbol pip sizes: explicit overrides, else the JPY convention.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipSizes {
    overrides: HashMap<String, f64>,
}

impl PipSizes {
    pub fn new(overrides: HashMap<String, f64>) -> Self {
        Self { overrides }
    }

    pub fn pip_size(&self, symbol: &str) -> f64 {
        if let Some(p) = self.overrides.get(symbol) {
            return *p;
        }
        match crate::types::split_pair(symbol) {
            Some((_, quote)) if quote == "JPY" => JPY_PIP,
            _ => DEFAULT_PIP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Tracked currency set (CURRENCIES, comma-separated)
    pub currencies: Vec<String>,
    /// Percent-change windows (WINDOWS, comma-separated labels)
    pub windows: Vec<WindowSpec>,
    pub retention_slack_ms: i64,
    pub refresh_interval_ms: u64,
    pub oscillators: OscillatorParams,
    /// Burst trigger grid (TRIGGER_GRID, "M:W" pairs)
    pub triggers: Vec<TriggerSpec>,
    /// Forward outcome grid (OUTCOME_GRID, "K:T" pairs)
    pub outcomes: Vec<OutcomeSpec>,
    /// Slack beyond `W` allowed between a burst's two samples before the
    /// span is treated as a data gap (BURST_GAP_MINUTES)
    pub burst_gap_ms: i64,
    pub n_min: u64,
    pub laplace_alpha: f64,
    pub state_key: StateKeySpec,
    pub pip_sizes: PipSizes,
    /// Symbols the batch scanner covers (SCAN_SYMBOLS). Empty = all in the bars table.
    pub scan_symbols: Vec<String>,
    pub table_reload_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let windows = list(&var("WINDOWS", "15m,1h,4h,8h,12h,24h"))
            .into_iter()
            .map(|l| {
                WindowSpec::parse(&l)
                    .ok_or_else(|| AppError::Config(format!("WINDOWS: bad label '{l}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        if windows.is_empty() {
            return Err(AppError::Config("WINDOWS must name at least one window".to_string()));
        }

        let osc_window = var("OSC_WINDOW", "1h");
        if !windows.iter().any(|w| w.label == osc_window) {
            return Err(AppError::Config(format!(
                "OSC_WINDOW '{osc_window}' is not one of WINDOWS"
            )));
        }

        // Pips may be fractional; window and horizon are whole minutes.
        let triggers = pairs::<f64, i64>(&var("TRIGGER_GRID", "10:10,15:10,20:15,30:30"), "TRIGGER_GRID")?
            .into_iter()
            .map(|(m, w)| TriggerSpec::new(m, w))
            .collect::<Vec<_>>();
        let outcomes = pairs::<f64, i64>(&var("OUTCOME_GRID", "10:30,15:60,20:120"), "OUTCOME_GRID")?
            .into_iter()
            .map(|(k, t)| OutcomeSpec::new(k, t))
            .collect::<Vec<_>>();

        let burst_gap_minutes: i64 = parse("BURST_GAP_MINUTES", &var("BURST_GAP_MINUTES", "1"))?;
        if burst_gap_minutes < 0 {
            return Err(AppError::Config("BURST_GAP_MINUTES must not be negative".to_string()));
        }

        let state_rsi_period: usize = parse("STATE_RSI_PERIOD", &var("STATE_RSI_PERIOD", "14"))?;
        let state_vol = var("STATE_VOL_WINDOWS", "15:120");
        let vol_windows = match pairs::<usize, usize>(&state_vol, "STATE_VOL_WINDOWS")?.as_slice() {
            [] => None,
            [(short, long)] if *short >= 2 && long > short => Some((*short, *long)),
            _ => {
                return Err(AppError::Config(
                    "STATE_VOL_WINDOWS must be a single 'short:long' pair with 2 <= short < long"
                        .to_string(),
                ))
            }
        };

        let pip_overrides = list(&var("PIP_SIZES", ""))
            .into_iter()
            .map(|entry| {
                let (sym, pip) = entry
                    .split_once(':')
                    .ok_or_else(|| AppError::Config(format!("PIP_SIZES: bad entry '{entry}'")))?;
                let pip: f64 = parse("PIP_SIZES", pip)?;
                if pip <= 0.0 {
                    return Err(AppError::Config(format!("PIP_SIZES: non-positive pip for {sym}")));
                }
                Ok((sym.to_string(), pip))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        let laplace_alpha: f64 = parse("LAPLACE_ALPHA", &var("LAPLACE_ALPHA", "1.0"))?;
        if !(laplace_alpha > 0.0) {
            return Err(AppError::Config("LAPLACE_ALPHA must be positive".to_string()));
        }

        let overbought: f64 = parse("OVERBOUGHT", &var("OVERBOUGHT", "70"))?;
        let oversold: f64 = parse("OVERSOLD", &var("OVERSOLD", "30"))?;
        if oversold >= overbought {
            return Err(AppError::Config("OVERSOLD must be below OVERBOUGHT".to_string()));
        }

        let oscillators = OscillatorParams {
            osc_window,
            rsi_period: positive("RSI_PERIOD", &var("RSI_PERIOD", "14"))?,
            stoch_k: positive("STOCH_K", &var("STOCH_K", "14"))?,
            stoch_d: positive("STOCH_D", &var("STOCH_D", "3"))?,
            zscore_window: positive("ZSCORE_WINDOW", &var("ZSCORE_WINDOW", "20"))?,
            prank_window: positive("PRANK_WINDOW", &var("PRANK_WINDOW", "50"))?,
            thresholds: Thresholds { overbought, oversold },
            zscore_band: parse("ZSCORE_BAND", &var("ZSCORE_BAND", "2.0"))?,
        };

        Ok(Self {
            log_level: var("LOG_LEVEL", "info"),
            db_path: var("DB_PATH", "fx_edge.db"),
            api_port: parse("API_PORT", &var("API_PORT", "3000"))?,
            currencies: list(&var("CURRENCIES", "EUR,USD,GBP,JPY,CHF,CAD,AUD,NZD"))
                .into_iter()
                .map(|c| c.to_ascii_uppercase())
                .collect(),
            windows,
            retention_slack_ms: parse::<i64>(
                "RETENTION_SLACK_MINUTES",
                &var("RETENTION_SLACK_MINUTES", "30"),
            )? * MINUTE_MS,
            refresh_interval_ms: positive::<u64>(
                "REFRESH_INTERVAL_MS",
                &var("REFRESH_INTERVAL_MS", "1000"),
            )?,
            oscillators,
            triggers,
            outcomes,
            burst_gap_ms: burst_gap_minutes * MINUTE_MS,
            n_min: parse("N_MIN", &var("N_MIN", "200"))?,
            laplace_alpha,
            state_key: StateKeySpec {
                rsi_period: (state_rsi_period > 0).then_some(state_rsi_period),
                vol_windows,
            },
            pip_sizes: PipSizes::new(pip_overrides),
            scan_symbols: list(&var("SCAN_SYMBOLS", "")),
            table_reload_secs: positive("TABLE_RELOAD_SECS", &var("TABLE_RELOAD_SECS", "300"))?,
        })
    }

    /// How long tick history must be kept so every live consumer can answer:
    /// the longest percent-change window, the longest trigger lookback and
    /// the state-key lookback, plus slack.
    pub fn retention_ms(&self) -> i64 {
        let windows = self.windows.iter().map(|w| w.length_ms).max().unwrap_or(0);
        let triggers = self.triggers.iter().map(|t| t.window_ms()).max().unwrap_or(0);
        let state = self.state_key.lookback_minutes() as i64 * MINUTE_MS;
        windows.max(triggers).max(state) + self.retention_slack_ms
    }
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| AppError::Config(format!("{key}: cannot parse '{raw}'")))
}

fn positive<T: FromStr + PartialOrd + Default>(key: &str, raw: &str) -> Result<T> {
    let v: T = parse(key, raw)?;
    if v <= T::default() {
        return Err(AppError::Config(format!("{key} must be positive")));
    }
    Ok(v)
}

/// Parses "a:b,c:d" into positive pairs.
fn pairs<A, B>(raw: &str, key: &str) -> Result<Vec<(A, B)>>
where
    A: FromStr + PartialOrd + Default,
    B: FromStr + PartialOrd + Default,
{
    list(raw)
        .into_iter()
        .map(|entry| {
            let (a, b) = entry
                .split_once(':')
                .ok_or_else(|| AppError::Config(format!("{key}: expected 'a:b', got '{entry}'")))?;
            let a: A = parse(key, a)?;
            let b: B = parse(key, b)?;
            if a <= A::default() || b <= B::default() {
                return Err(AppError::Config(format!("{key}: values must be positive in '{entry}'")));
            }
            Ok((a, b))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = from_pairs(&[]).unwrap();
        assert_eq!(cfg.windows.len(), 6);
        assert_eq!(cfg.currencies.len(), 8);
        assert_eq!(cfg.n_min, 200);
        assert_eq!(cfg.laplace_alpha, 1.0);
        assert_eq!(cfg.triggers.len(), 4);
        assert_eq!(cfg.outcomes.len(), 3);
        // 24h window dominates, plus 30 minutes of slack
        assert_eq!(cfg.retention_ms(), (24 * 60 + 30) * MINUTE_MS);
    }

    #[test]
    fn grids_parse_from_pairs() {
        let cfg = from_pairs(&[("TRIGGER_GRID", "10:10"), ("OUTCOME_GRID", "15:60, 5:5")]).unwrap();
        assert_eq!(cfg.triggers, vec![TriggerSpec::new(10.0, 10)]);
        assert_eq!(cfg.outcomes[1], OutcomeSpec::new(5.0, 5));
    }

    #[test]
    fn bad_values_are_config_errors() {
        assert!(matches!(from_pairs(&[("WINDOWS", "15q")]), Err(AppError::Config(_))));
        assert!(matches!(from_pairs(&[("TRIGGER_GRID", "10")]), Err(AppError::Config(_))));
        assert!(matches!(from_pairs(&[("LAPLACE_ALPHA", "0")]), Err(AppError::Config(_))));
        assert!(matches!(from_pairs(&[("OSC_WINDOW", "2h")]), Err(AppError::Config(_))));
        assert!(matches!(from_pairs(&[("RSI_PERIOD", "0")]), Err(AppError::Config(_))));
        assert!(matches!(
            from_pairs(&[("OVERBOUGHT", "20"), ("OVERSOLD", "80")]),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn grid_minutes_must_be_whole_and_positive() {
        for grid in ["10:0.5", "10:0", "10:-5"] {
            assert!(
                matches!(from_pairs(&[("TRIGGER_GRID", grid)]), Err(AppError::Config(_))),
                "TRIGGER_GRID={grid}"
            );
            assert!(
                matches!(from_pairs(&[("OUTCOME_GRID", grid)]), Err(AppError::Config(_))),
                "OUTCOME_GRID={grid}"
            );
        }
        let cfg = from_pairs(&[("TRIGGER_GRID", "7.5:5")]).unwrap();
        assert_eq!(cfg.triggers, vec![TriggerSpec::new(7.5, 5)]);
        assert!(matches!(from_pairs(&[("STATE_VOL_WINDOWS", "15.5:120")]), Err(AppError::Config(_))));
    }

    #[test]
    fn burst_gap_defaults_to_one_minute() {
        assert_eq!(from_pairs(&[]).unwrap().burst_gap_ms, MINUTE_MS);
        assert_eq!(from_pairs(&[("BURST_GAP_MINUTES", "0")]).unwrap().burst_gap_ms, 0);
        assert!(matches!(from_pairs(&[("BURST_GAP_MINUTES", "-1")]), Err(AppError::Config(_))));
    }

    #[test]
    fn pip_sizes_follow_quote_currency_unless_overridden() {
        let cfg = from_pairs(&[("PIP_SIZES", "XAUUSD:0.1")]).unwrap();
        assert_eq!(cfg.pip_sizes.pip_size("EURUSD"), 0.0001);
        assert_eq!(cfg.pip_sizes.pip_size("USDJPY"), 0.01);
        assert_eq!(cfg.pip_sizes.pip_size("XAUUSD"), 0.1);
    }

    #[test]
    fn state_key_components_can_be_disabled() {
        let cfg = from_pairs(&[("STATE_RSI_PERIOD", "0"), ("STATE_VOL_WINDOWS", "")]).unwrap();
        assert_eq!(cfg.state_key, StateKeySpec::default());
    }
}

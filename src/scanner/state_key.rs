use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::vol_regime;
use crate::oscillator::rsi::rsi_of;

/// RSI for the state key is computed over this many periods of closes,
/// so the value depends only on a bounded tail of the series.
const RSI_LOOKBACK_PERIODS: usize = 4;

/// Ordered `(name, value)` context components at a bar, e.g.
/// `rsi=3;vol=high`. The empty key (no stratification) renders as `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey(Vec<(String, String)>);

impl StateKey {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.0.push((name.to_string(), value.into()));
        self
    }

    pub fn components(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// This key and every coarser prefix, most specific first, ending with
    /// the empty key.
    pub fn prefixes(&self) -> Vec<StateKey> {
        (0..=self.0.len())
            .rev()
            .map(|n| StateKey(self.0[..n].to_vec()))
            .collect()
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "*");
        }
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{}", parts.join(";"))
    }
}

impl std::str::FromStr for StateKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(StateKey::empty());
        }
        s.split(';')
            .map(|part| {
                let (k, v) = part
                    .split_once('=')
                    .ok_or_else(|| format!("state key component '{part}' is not name=value"))?;
                if k.is_empty() || v.is_empty() || v.contains('=') {
                    return Err(format!("state key component '{part}' is malformed"));
                }
                Ok((k.to_string(), v.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(StateKey)
    }
}

impl Serialize for StateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Which context components go into the key.
///
/// `compute` sees only the closes up to and including the current bar; the
/// scanner passes `&closes[..=i]`, the live matcher passes 1-minute closes
/// resampled from ticks up to now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateKeySpec {
    pub rsi_period: Option<usize>,
    /// (short, long) windows of 1-minute changes for the volatility regime.
    pub vol_windows: Option<(usize, usize)>,
}

impl StateKeySpec {
    /// Closes needed for every component to be defined.
    pub fn lookback_minutes(&self) -> usize {
        let rsi = self.rsi_period.map_or(0, |p| p * RSI_LOOKBACK_PERIODS + 1);
        let vol = self.vol_windows.map_or(0, |(_, long)| long + 1);
        rsi.max(vol)
    }

    pub fn compute(&self, closes: &[f64]) -> StateKey {
        let mut key = StateKey::empty();
        if let Some(period) = self.rsi_period {
            key = key.with("rsi", rsi_decile(closes, period));
        }
        if let Some((short, long)) = self.vol_windows {
            key = key.with("vol", vol_regime(closes, short, long));
        }
        key
    }
}

fn rsi_decile(closes: &[f64], period: usize) -> String {
    let need = period * RSI_LOOKBACK_PERIODS + 1;
    if closes.len() < need {
        return "na".to_string();
    }
    match rsi_of(&closes[closes.len() - need..], period) {
        Some(rsi) => ((rsi / 10.0).floor() as u8).min(9).to_string(),
        None => "na".to_string(),
    }
}

fn vol_regime(closes: &[f64], short: usize, long: usize) -> &'static str {
    if closes.len() < long + 1 {
        return "na";
    }
    let tail = &closes[closes.len() - (long + 1)..];
    let changes: Vec<f64> = tail.windows(2).map(|w| w[1] - w[0]).collect();
    let long_std = std_pop(&changes);
    let short_std = std_pop(&changes[changes.len() - short..]);
    if long_std == 0.0 {
        return "normal";
    }
    let ratio = short_std / long_std;
    if ratio < vol_regime::LOW_MAX {
        "low"
    } else if ratio >= vol_regime::HIGH_MIN {
        "high"
    } else {
        "normal"
    }
}

fn std_pop(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_form_round_trips() {
        let key = StateKey::empty().with("rsi", "3").with("vol", "high");
        assert_eq!(key.to_string(), "rsi=3;vol=high");
        assert_eq!("rsi=3;vol=high".parse::<StateKey>().unwrap(), key);
        assert_eq!("*".parse::<StateKey>().unwrap(), StateKey::empty());
        assert_eq!(StateKey::empty().to_string(), "*");
        assert!("rsi".parse::<StateKey>().is_err());
        assert!("rsi=".parse::<StateKey>().is_err());
    }

    #[test]
    fn prefixes_run_from_exact_to_empty() {
        let key = StateKey::empty().with("rsi", "3").with("vol", "low");
        let p: Vec<String> = key.prefixes().iter().map(|k| k.to_string()).collect();
        assert_eq!(p, vec!["rsi=3;vol=low", "rsi=3", "*"]);
    }

    #[test]
    fn short_history_renders_na() {
        let spec = StateKeySpec { rsi_period: Some(14), vol_windows: Some((15, 120)) };
        assert_eq!(spec.compute(&[1.0; 10]).to_string(), "rsi=na;vol=na");
        assert_eq!(spec.lookback_minutes(), 121);
    }

    #[test]
    fn rising_closes_land_in_top_rsi_decile() {
        let spec = StateKeySpec { rsi_period: Some(5), vol_windows: None };
        let closes: Vec<f64> = (0..30).map(|i| 1.0 + i as f64 * 0.0001).collect();
        assert_eq!(spec.compute(&closes).to_string(), "rsi=9");
    }

    #[test]
    fn volatility_regime_compares_short_to_long() {
        let spec = StateKeySpec { rsi_period: None, vol_windows: Some((5, 20)) };
        // quiet for 15 changes then large swings
        let mut closes = vec![1.0];
        for i in 0..20 {
            let step = if i < 15 { 0.0001 } else { 0.002 };
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            let last = *closes.last().unwrap();
            closes.push(last + sign * step);
        }
        assert_eq!(spec.compute(&closes).to_string(), "vol=high");

        let flat = vec![1.0; 21];
        assert_eq!(spec.compute(&flat).to_string(), "vol=normal");
    }

    #[test]
    fn serde_uses_text_form() {
        let key = StateKey::empty().with("vol", "low");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"vol=low\"");
        assert_eq!(serde_json::from_str::<StateKey>(&json).unwrap(), key);
    }
}

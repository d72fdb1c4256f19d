use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ticks and series points
// ---------------------------------------------------------------------------

/// One quote from the price feed. Millisecond UTC epoch timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub instrument: String,
    pub bid: f64,
    pub ask: f64,
    pub ts_ms: i64,
}

impl Tick {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// Unit stored by every bounded series: mid price or synthetic strength.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub ts_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(ts_ms: i64, value: f64) -> Self {
        Self { ts_ms, value }
    }
}

/// One historical 1-minute OHLC bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

pub const MINUTE_MS: i64 = 60_000;

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// `None` for a zero move: a flat move never fires a trigger.
    pub fn from_move(delta: f64) -> Option<Self> {
        if delta > 0.0 {
            Some(Direction::Up)
        } else if delta < 0.0 {
            Some(Direction::Down)
        } else {
            None
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Percent-change windows
// ---------------------------------------------------------------------------

/// A labelled trailing window, e.g. "15m" → 900_000 ms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub label: String,
    pub length_ms: i64,
}

impl WindowSpec {
    /// Parses `<n>m`, `<n>h` or `<n>d`.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.len() < 2 {
            return None;
        }
        let (num, unit) = label.split_at(label.len() - 1);
        let n: i64 = num.parse().ok().filter(|n| *n > 0)?;
        let unit_ms = match unit {
            "m" => MINUTE_MS,
            "h" => 60 * MINUTE_MS,
            "d" => 24 * 60 * MINUTE_MS,
            _ => return None,
        };
        Some(Self {
            label: label.to_string(),
            length_ms: n * unit_ms,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowChange {
    pub label: String,
    pub pct: f64,
}

/// Percent change per window label, in configured window order.
/// Labels without enough history are absent, never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PercentChangeResult {
    pub changes: Vec<WindowChange>,
}

impl PercentChangeResult {
    pub fn get(&self, label: &str) -> Option<f64> {
        self.changes.iter().find(|c| c.label == label).map(|c| c.pct)
    }

    pub fn insert(&mut self, label: &str, pct: f64) {
        match self.changes.iter_mut().find(|c| c.label == label) {
            Some(c) => c.pct = pct,
            None => self.changes.push(WindowChange { label: label.to_string(), pct }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

// ---------------------------------------------------------------------------
// Instrument naming
// ---------------------------------------------------------------------------

/// Splits a broker instrument id into (base, quote).
///
/// Accepts "EURUSD", "EUR/USD", "EUR_USD" and broker suffixes such as
/// "EURUSDm" or "EURUSD.pro". Returns `None` for anything else.
pub fn split_pair(instrument: &str) -> Option<(String, String)> {
    let letters: String = instrument
        .chars()
        .filter(|c| !matches!(c, '/' | '_' | '-'))
        .take(6)
        .collect();
    if letters.len() != 6 || !letters.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    Some((letters[..3].to_string(), letters[3..].to_string()))
}

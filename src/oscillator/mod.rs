//! Momentum and extremity transforms over any bounded numeric series.
//!
//! Each transform owns its accumulator; an `OscillatorBank` entry owns one
//! transform and nothing else reads or writes it.

pub mod bank;
pub mod differential;
pub mod ring;
pub mod rolling;
pub mod rsi;
pub mod stochastic;

use serde::{Deserialize, Serialize};

pub use bank::{OscillatorBank, OscillatorSpec, SeriesProvider, SeriesSource};
pub use ring::RingBuf;

use rolling::{PercentRankState, ZScoreState};
use rsi::RsiState;
use stochastic::StochasticState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OscillatorKind {
    Rsi { period: usize },
    Stochastic { k_period: usize, d_period: usize },
    ZScore { window: usize },
    PercentRank { window: usize },
}

impl std::fmt::Display for OscillatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OscillatorKind::Rsi { period } => write!(f, "rsi({period})"),
            OscillatorKind::Stochastic { k_period, d_period } => write!(f, "stoch({k_period},{d_period})"),
            OscillatorKind::ZScore { window } => write!(f, "zscore({window})"),
            OscillatorKind::PercentRank { window } => write!(f, "prank({window})"),
        }
    }
}

/// Classification bands. A value at or above `overbought` is overbought,
/// at or below `oversold` is oversold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub overbought: f64,
    pub oversold: f64,
}

impl Thresholds {
    pub fn classify(&self, value: f64) -> Zone {
        if value >= self.overbought {
            Zone::Overbought
        } else if value <= self.oversold {
            Zone::Oversold
        } else {
            Zone::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Overbought,
    Oversold,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OscillatorReading {
    pub ts_ms: i64,
    pub value: f64,
    /// Stochastic %D; absent for other transforms or until warm.
    pub signal: Option<f64>,
    pub zone: Zone,
}

/// Either a reading, or how far the transform is from its first reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OscillatorOutput {
    Insufficient { have: usize, need: usize },
    Ready(OscillatorReading),
}

impl OscillatorOutput {
    pub fn reading(&self) -> Option<&OscillatorReading> {
        match self {
            OscillatorOutput::Ready(r) => Some(r),
            OscillatorOutput::Insufficient { .. } => None,
        }
    }
}

/// Owned accumulator for one transform instance.
#[derive(Debug, Clone)]
pub enum OscillatorState {
    Rsi(RsiState),
    Stochastic(StochasticState),
    ZScore(ZScoreState),
    PercentRank(PercentRankState),
}

impl OscillatorState {
    pub fn new(kind: OscillatorKind) -> Self {
        match kind {
            OscillatorKind::Rsi { period } => OscillatorState::Rsi(RsiState::new(period)),
            OscillatorKind::Stochastic { k_period, d_period } => {
                OscillatorState::Stochastic(StochasticState::new(k_period, d_period))
            }
            OscillatorKind::ZScore { window } => OscillatorState::ZScore(ZScoreState::new(window)),
            OscillatorKind::PercentRank { window } => {
                OscillatorState::PercentRank(PercentRankState::new(window))
            }
        }
    }

    pub fn update(&mut self, point: crate::types::TimeSeriesPoint, thresholds: &Thresholds) -> OscillatorOutput {
        let (value, signal) = match self {
            OscillatorState::Rsi(s) => (s.update(point.value), None),
            OscillatorState::Stochastic(s) => match s.update(point.value) {
                Some((k, d)) => (Some(k), d),
                None => (None, None),
            },
            OscillatorState::ZScore(s) => (s.update(point.value), None),
            OscillatorState::PercentRank(s) => (s.update(point.value), None),
        };
        match value {
            Some(value) => OscillatorOutput::Ready(OscillatorReading {
                ts_ms: point.ts_ms,
                value,
                signal,
                zone: thresholds.classify(value),
            }),
            None => self.insufficient(),
        }
    }

    pub fn insufficient(&self) -> OscillatorOutput {
        let (have, need) = match self {
            OscillatorState::Rsi(s) => (s.seen(), s.required()),
            OscillatorState::Stochastic(s) => (s.seen(), s.required()),
            OscillatorState::ZScore(s) => (s.seen(), s.required()),
            OscillatorState::PercentRank(s) => (s.seen(), s.required()),
        };
        OscillatorOutput::Insufficient { have, need }
    }
}

use serde::{Deserialize, Serialize};

use crate::config::PIP_EPSILON;
use crate::types::{Direction, MINUTE_MS};

/// Burst trigger: price moved at least `min_pips` within `window_minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub min_pips: f64,
    pub window_minutes: i64,
}

impl TriggerSpec {
    pub fn new(min_pips: f64, window_minutes: i64) -> Self {
        Self { min_pips, window_minutes }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_minutes * MINUTE_MS
    }

    /// e.g. "M10_W10"
    pub fn label(&self) -> String {
        format!("M{}_W{}", fmt_pips(self.min_pips), self.window_minutes)
    }

    /// Whether two samples `elapsed_ms` apart still describe a move within
    /// this window. A longer span means the data has a gap in between.
    pub fn spans_window(&self, elapsed_ms: i64, gap_tolerance_ms: i64) -> bool {
        elapsed_ms <= self.window_ms() + gap_tolerance_ms
    }
}

/// Forward outcome: a further `target_pips` reached within `horizon_minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSpec {
    pub target_pips: f64,
    pub horizon_minutes: i64,
}

impl OutcomeSpec {
    pub fn new(target_pips: f64, horizon_minutes: i64) -> Self {
        Self { target_pips, horizon_minutes }
    }

    pub fn horizon_ms(&self) -> i64 {
        self.horizon_minutes * MINUTE_MS
    }

    /// e.g. "K15_T60"
    pub fn label(&self) -> String {
        format!("K{}_T{}", fmt_pips(self.target_pips), self.horizon_minutes)
    }
}

fn fmt_pips(p: f64) -> String {
    if p.fract() == 0.0 {
        format!("{}", p as i64)
    } else {
        format!("{p}")
    }
}

/// A fired trigger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Burst {
    pub trigger: TriggerSpec,
    pub direction: Direction,
    pub move_pips: f64,
}

/// Fires when `|current - reference|` is at least `min_pips` pips.
/// A zero move never fires.
pub fn detect_burst(current: f64, reference: f64, pip: f64, trigger: &TriggerSpec) -> Option<Burst> {
    let move_pips = (current - reference) / pip;
    if move_pips.abs() + PIP_EPSILON < trigger.min_pips {
        return None;
    }
    let direction = Direction::from_move(move_pips)?;
    Some(Burst {
        trigger: *trigger,
        direction,
        move_pips,
    })
}

/// Whether a favourable excursion (in pips) reaches the outcome target.
pub fn target_reached(excursion_pips: f64, outcome: &OutcomeSpec) -> bool {
    excursion_pips + PIP_EPSILON >= outcome.target_pips
}

/// Live evaluation order: tightest window first, then the largest move
/// among triggers sharing a window.
pub fn priority_order(triggers: &[TriggerSpec]) -> Vec<TriggerSpec> {
    let mut ordered = triggers.to_vec();
    ordered.sort_by(|a, b| {
        a.window_minutes
            .cmp(&b.window_minutes)
            .then(b.min_pips.total_cmp(&a.min_pips))
    });
    ordered
}

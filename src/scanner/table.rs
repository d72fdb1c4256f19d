use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::confidence_tiers;
use crate::scanner::state_key::StateKey;
use crate::types::Direction;

/// z for the 95% Wilson score interval.
const WILSON_Z: f64 = 1.96;

/// Laplace-smoothed success rate: `(s + α) / (n + 2α)`.
/// Strictly inside (0, 1) for any α > 0.
pub fn laplace(successes: u64, total: u64, alpha: f64) -> f64 {
    (successes as f64 + alpha) / (total as f64 + 2.0 * alpha)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn from_total(total: u64) -> Self {
        if total >= confidence_tiers::HIGH_MIN {
            ConfidenceTier::High
        } else if total >= confidence_tiers::MEDIUM_MIN {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

/// Identity of one scan cell within a symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RowKey {
    pub trigger_label: String,
    pub outcome_label: String,
    pub direction: Direction,
    pub state_key: StateKey,
}

impl RowKey {
    pub fn new(trigger_label: &str, outcome_label: &str, direction: Direction, state_key: StateKey) -> Self {
        Self {
            trigger_label: trigger_label.to_string(),
            outcome_label: outcome_label.to_string(),
            direction,
            state_key,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub successes: u64,
    pub total: u64,
}

impl Counts {
    pub fn new(successes: u64, total: u64) -> Self {
        Self { successes, total }
    }
}

/// One (trigger, outcome, direction, state) cell of a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityRow {
    pub symbol: String,
    pub trigger_label: String,
    pub outcome_label: String,
    pub direction: Direction,
    pub state_key: StateKey,
    pub successes: u64,
    pub total: u64,
    pub probability: f64,
}

impl ProbabilityRow {
    pub fn new(symbol: &str, key: RowKey, counts: Counts, alpha: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            trigger_label: key.trigger_label,
            outcome_label: key.outcome_label,
            direction: key.direction,
            state_key: key.state_key,
            successes: counts.successes,
            total: counts.total,
            probability: laplace(counts.successes, counts.total, alpha),
        }
    }

    /// Lower bound of the 95% Wilson interval on the raw rate; 0 when empty.
    pub fn wilson_lower(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let n = self.total as f64;
        let p = self.successes as f64 / n;
        let z2 = WILSON_Z * WILSON_Z;
        let centre = p + z2 / (2.0 * n);
        let margin = WILSON_Z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt();
        ((centre - margin) / (1.0 + z2 / n)).max(0.0)
    }

    pub fn confidence(&self) -> ConfidenceTier {
        ConfidenceTier::from_total(self.total)
    }
}

/// Immutable result of one scan, indexed for live lookup by
/// (symbol, trigger label, direction).
#[derive(Debug, Default)]
pub struct ProbabilityTable {
    rows: Vec<ProbabilityRow>,
    index: HashMap<(String, String, Direction), Vec<usize>>,
}

impl ProbabilityTable {
    pub fn new(rows: Vec<ProbabilityRow>) -> Self {
        let mut index: HashMap<(String, String, Direction), Vec<usize>> = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            index
                .entry((row.symbol.clone(), row.trigger_label.clone(), row.direction))
                .or_default()
                .push(i);
        }
        Self { rows, index }
    }

    pub fn rows(&self) -> &[ProbabilityRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows by probability, then sample size, descending.
    pub fn ranked(&self) -> Vec<&ProbabilityRow> {
        let mut ranked: Vec<&ProbabilityRow> = self.rows.iter().collect();
        ranked.sort_by(|a, b| {
            b.probability
                .total_cmp(&a.probability)
                .then(b.total.cmp(&a.total))
        });
        ranked
    }

    pub fn for_symbol<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a ProbabilityRow> + 'a {
        self.rows.iter().filter(move |r| r.symbol == symbol)
    }

    /// Every row for one fired trigger, across outcomes and states.
    pub fn candidates(&self, symbol: &str, trigger_label: &str, direction: Direction) -> Vec<&ProbabilityRow> {
        self.index
            .get(&(symbol.to_string(), trigger_label.to_string(), direction))
            .map(|idx| idx.iter().map(|&i| &self.rows[i]).collect())
            .unwrap_or_default()
    }
}

//! Row types for the SQLite schema in `migrations/`.

use crate::error::{AppError, Result};
use crate::scanner::ProbabilityRow;
use crate::types::Bar;

#[derive(Debug, sqlx::FromRow)]
pub struct BarRecord {
    pub ts_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl From<BarRecord> for Bar {
    fn from(r: BarRecord) -> Self {
        Bar {
            ts_ms: r.ts_ms,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ProbabilityRecord {
    pub symbol: String,
    pub trigger_label: String,
    pub outcome_label: String,
    pub direction: String,
    pub state_key: String,
    pub successes: i64,
    pub total: i64,
    pub probability: f64,
    pub generated_at_ms: i64,
}

impl TryFrom<ProbabilityRecord> for ProbabilityRow {
    type Error = AppError;

    fn try_from(r: ProbabilityRecord) -> Result<Self> {
        let direction = r.direction.parse().map_err(|e: String| AppError::invalid(&r.symbol, e))?;
        let state_key = r.state_key.parse().map_err(|e: String| AppError::invalid(&r.symbol, e))?;
        if r.successes < 0 || r.total < r.successes {
            return Err(AppError::invalid(
                &r.symbol,
                format!("bad counts {}/{}", r.successes, r.total),
            ));
        }
        Ok(ProbabilityRow {
            symbol: r.symbol,
            trigger_label: r.trigger_label,
            outcome_label: r.outcome_label,
            direction,
            state_key,
            successes: r.successes as u64,
            total: r.total as u64,
            probability: r.probability,
        })
    }
}

//! In-memory latency histogram for the refresh loop.
//! Records the wall time of each refresh pass.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::error::{AppError, Result};

/// Shared latency stats. Refresh loop records, API reads.
/// Values stored in microseconds.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_us: Option<u64>,
    pub p95_us: Option<u64>,
    pub p99_us: Option<u64>,
}

impl LatencyStats {
    /// Tracks 1us to 100s, 3 significant figures.
    pub fn new() -> Result<Self> {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 100_000_000, 3)
            .map_err(|e| AppError::Config(format!("latency histogram: {e}")))?;
        Ok(Self {
            inner: Mutex::new(histogram),
        })
    }

    pub fn record_us(&self, us: u64) {
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(us.max(1));
        }
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().min(u128::from(u64::MAX)) as u64;
        self.record_us(us);
    }

    /// Percentiles are `None` until the first sample.
    pub fn summary(&self) -> LatencySummary {
        let Ok(h) = self.inner.lock() else {
            return LatencySummary { samples: 0, p50_us: None, p95_us: None, p99_us: None };
        };
        if h.len() == 0 {
            return LatencySummary { samples: 0, p50_us: None, p95_us: None, p99_us: None };
        }
        LatencySummary {
            samples: h.len(),
            p50_us: Some(h.value_at_quantile(0.5)),
            p95_us: Some(h.value_at_quantile(0.95)),
            p99_us: Some(h.value_at_quantile(0.99)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let stats = LatencyStats::new().unwrap();
        assert_eq!(stats.summary().samples, 0);
        assert_eq!(stats.summary().p50_us, None);
    }

    #[test]
    fn percentiles_follow_recorded_samples() {
        let stats = LatencyStats::new().unwrap();
        for us in 1..=100 {
            stats.record(Duration::from_micros(us));
        }
        let s = stats.summary();
        assert_eq!(s.samples, 100);
        let p50 = s.p50_us.unwrap();
        assert!((49..=51).contains(&p50), "p50 = {p50}");
        assert!(s.p99_us.unwrap() >= s.p95_us.unwrap());
    }
}

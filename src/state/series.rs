use std::collections::VecDeque;

use crate::types::TimeSeriesPoint;

/// Returned when a point would move a series backwards in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampRegressed {
    pub last_ts_ms: i64,
    pub ts_ms: i64,
}

/// Append-only, time-bounded series of points.
///
/// Timestamps are non-decreasing. Equal timestamps are kept in arrival order,
/// so a lookup at that instant sees the last write. Points older than
/// `newest - retention_ms` are pruned on every push, and the deque never
/// grows past `max_points`.
#[derive(Debug, Clone)]
pub struct BoundedSeries {
    points: VecDeque<TimeSeriesPoint>,
    retention_ms: i64,
    max_points: usize,
}

impl BoundedSeries {
    pub fn new(retention_ms: i64, max_points: usize) -> Self {
        Self {
            points: VecDeque::new(),
            retention_ms,
            max_points: max_points.max(1),
        }
    }

    pub fn push(&mut self, point: TimeSeriesPoint) -> Result<(), TimestampRegressed> {
        if let Some(last) = self.points.back() {
            if point.ts_ms < last.ts_ms {
                return Err(TimestampRegressed {
                    last_ts_ms: last.ts_ms,
                    ts_ms: point.ts_ms,
                });
            }
        }
        self.points.push_back(point);
        self.prune(point.ts_ms);
        Ok(())
    }

    fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.retention_ms;
        while self.points.front().is_some_and(|p| p.ts_ms < cutoff) {
            self.points.pop_front();
        }
        while self.points.len() > self.max_points {
            self.points.pop_front();
        }
    }

    pub fn latest(&self) -> Option<TimeSeriesPoint> {
        self.points.back().copied()
    }

    pub fn earliest(&self) -> Option<TimeSeriesPoint> {
        self.points.front().copied()
    }

    /// Latest point with `ts_ms <= ts`. When the whole series is newer than
    /// `ts`, the earliest point is returned instead. `None` only when empty.
    pub fn at_or_before(&self, ts_ms: i64) -> Option<TimeSeriesPoint> {
        let idx = self.points.partition_point(|p| p.ts_ms <= ts_ms);
        if idx == 0 {
            self.points.front().copied()
        } else {
            self.points.get(idx - 1).copied()
        }
    }

    /// `at_or_before` without the earliest-sample fallback.
    pub fn covered_at_or_before(&self, ts_ms: i64) -> Option<TimeSeriesPoint> {
        self.at_or_before(ts_ms).filter(|p| p.ts_ms <= ts_ms)
    }

    /// Consistent copy for readers, oldest first.
    pub fn snapshot(&self) -> Vec<TimeSeriesPoint> {
        self.points.iter().copied().collect()
    }

    /// Copy of the points at or after `since_ts_ms`, oldest first.
    pub fn since(&self, since_ts_ms: i64) -> Vec<TimeSeriesPoint> {
        let start = self.points.partition_point(|p| p.ts_ms < since_ts_ms);
        self.points.range(start..).copied().collect()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TimeSeriesPoint> + '_ {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// `BoundedSeries::at_or_before` over a snapshot slice.
pub fn at_or_before(points: &[TimeSeriesPoint], ts_ms: i64) -> Option<TimeSeriesPoint> {
    let idx = points.partition_point(|p| p.ts_ms <= ts_ms);
    if idx == 0 {
        points.first().copied()
    } else {
        points.get(idx - 1).copied()
    }
}

/// Like `at_or_before`, but only if history actually reaches back to `ts_ms`.
pub fn covered_at_or_before(points: &[TimeSeriesPoint], ts_ms: i64) -> Option<TimeSeriesPoint> {
    at_or_before(points, ts_ms).filter(|p| p.ts_ms <= ts_ms)
}

use super::RingBuf;

/// Rolling z-score of the latest value against the trailing window.
/// A flat window (zero stdev) scores 0.
#[derive(Debug, Clone)]
pub struct ZScoreState {
    values: RingBuf,
}

impl ZScoreState {
    pub fn new(window: usize) -> Self {
        Self { values: RingBuf::new(window.max(2)) }
    }

    pub fn required(&self) -> usize {
        self.values.capacity()
    }

    pub fn seen(&self) -> usize {
        self.values.len()
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.values.push(value);
        if !self.values.full() {
            return None;
        }
        let std = self.values.std_pop();
        if std == 0.0 {
            return Some(0.0);
        }
        Some((value - self.values.mean()) / std)
    }
}

/// Rank of the latest value among the trailing window, scaled to [0, 100].
///
/// Counts the other values strictly below the latest, plus half of those
/// equal to it, over `window - 1`. A flat window ranks 50.
#[derive(Debug, Clone)]
pub struct PercentRankState {
    values: RingBuf,
}

impl PercentRankState {
    pub fn new(window: usize) -> Self {
        Self { values: RingBuf::new(window.max(2)) }
    }

    pub fn required(&self) -> usize {
        self.values.capacity()
    }

    pub fn seen(&self) -> usize {
        self.values.len()
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        self.values.push(value);
        if !self.values.full() {
            return None;
        }
        let others = self.values.len() - 1;
        let mut below = 0.0;
        // The latest value is the last element; skip it.
        for v in self.values.iter().take(others) {
            if v < value {
                below += 1.0;
            } else if v == value {
                below += 0.5;
            }
        }
        Some(below / others as f64 * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zscore_of_flat_window_is_zero() {
        let mut z = ZScoreState::new(4);
        let mut out = None;
        for _ in 0..4 {
            out = z.update(7.0);
        }
        assert_eq!(out, Some(0.0));
    }

    #[test]
    fn zscore_matches_population_stdev() {
        let mut z = ZScoreState::new(4);
        for v in [2.0, 4.0, 4.0] {
            assert_eq!(z.update(v), None);
        }
        // window [2,4,4,6]: mean 4, pop std sqrt(2)
        let out = z.update(6.0).unwrap();
        assert!((out - 2.0 / 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn percent_rank_extremes_and_ties() {
        let mut r = PercentRankState::new(5);
        for v in [1.0, 2.0, 3.0, 4.0] {
            assert_eq!(r.update(v), None);
        }
        assert_eq!(r.update(10.0), Some(100.0));
        assert_eq!(r.update(0.0), Some(0.0));

        let mut flat = PercentRankState::new(3);
        flat.update(5.0);
        flat.update(5.0);
        assert_eq!(flat.update(5.0), Some(50.0));
    }
}

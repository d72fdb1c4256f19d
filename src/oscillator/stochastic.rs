use super::RingBuf;

/// Stochastic oscillator over a raw value series.
///
/// %K = (last - min) / (max - min) * 100 over `k_period` values, 50 when the
/// window is flat. %D is the simple mean of the last `d_period` %K values.
#[derive(Debug, Clone)]
pub struct StochasticState {
    values: RingBuf,
    k_values: RingBuf,
}

impl StochasticState {
    pub fn new(k_period: usize, d_period: usize) -> Self {
        Self {
            values: RingBuf::new(k_period),
            k_values: RingBuf::new(d_period),
        }
    }

    pub fn required(&self) -> usize {
        self.values.capacity()
    }

    pub fn seen(&self) -> usize {
        self.values.len()
    }

    /// Returns `(%K, %D)`; %D is `None` until `d_period` %K values exist.
    pub fn update(&mut self, value: f64) -> Option<(f64, Option<f64>)> {
        self.values.push(value);
        if !self.values.full() {
            return None;
        }

        let lo = self.values.min();
        let hi = self.values.max();
        let k = if hi > lo { (value - lo) / (hi - lo) * 100.0 } else { 50.0 };

        self.k_values.push(k);
        let d = self.k_values.full().then(|| self.k_values.mean());
        Some((k, d))
    }
}

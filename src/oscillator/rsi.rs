/// RSI with Wilder smoothing of average gain/loss.
///
/// The first `period` changes seed the averages with a simple mean; after
/// that each change is folded in as `(avg * (period - 1) + x) / period`.
/// When `avg_loss == 0` the value is 100, including a perfectly flat series.
#[derive(Debug, Clone)]
pub struct RsiState {
    period: usize,
    prev: Option<f64>,
    avg_gain: f64,
    avg_loss: f64,
    gain_sum: f64,
    loss_sum: f64,
    count: usize,
    warm: bool,
}

impl RsiState {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev: None,
            avg_gain: 0.0,
            avg_loss: 0.0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            count: 0,
            warm: false,
        }
    }

    /// Samples needed before the first value: `period` changes plus the seed.
    pub fn required(&self) -> usize {
        self.period + 1
    }

    pub fn seen(&self) -> usize {
        self.count + usize::from(self.prev.is_some())
    }

    pub fn update(&mut self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return self.value();
        }
        let Some(prev) = self.prev.replace(value) else {
            return None;
        };

        let change = value - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        if self.warm {
            let p = self.period as f64;
            self.avg_gain = (self.avg_gain * (p - 1.0) + gain) / p;
            self.avg_loss = (self.avg_loss * (p - 1.0) + loss) / p;
        } else {
            self.gain_sum += gain;
            self.loss_sum += loss;
            self.count += 1;
            if self.count < self.period {
                return None;
            }
            self.avg_gain = self.gain_sum / self.period as f64;
            self.avg_loss = self.loss_sum / self.period as f64;
            self.warm = true;
        }
        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        if !self.warm {
            return None;
        }
        if self.avg_loss == 0.0 {
            return Some(100.0);
        }
        let rs = self.avg_gain / self.avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

/// RSI of a whole series, fresh state. `None` until warm.
pub fn rsi_of(values: &[f64], period: usize) -> Option<f64> {
    let mut state = RsiState::new(period);
    let mut out = None;
    for &v in values {
        out = state.update(v);
    }
    out
}

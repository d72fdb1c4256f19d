use crate::state::series::covered_at_or_before;
use crate::types::TimeSeriesPoint;

/// `D[t] = base[t] - quote[t]`, sampled at the base series' timestamps.
///
/// Each base point is paired with the latest quote point not after it.
/// Base points older than the first quote point are dropped.
pub fn align_difference(base: &[TimeSeriesPoint], quote: &[TimeSeriesPoint]) -> Vec<TimeSeriesPoint> {
    base.iter()
        .filter_map(|b| {
            covered_at_or_before(quote, b.ts_ms).map(|q| TimeSeriesPoint::new(b.ts_ms, b.value - q.value))
        })
        .collect()
}

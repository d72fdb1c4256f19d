use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::strength::PercentChangeCalculator;
use crate::types::{split_pair, PercentChangeResult};

/// Per-currency strength: the mean of `+pct` over instruments where the
/// currency is the base and `-pct` where it is the quote, per window label.
pub struct StrengthAggregator {
    calculator: Arc<PercentChangeCalculator>,
    currencies: Vec<String>,
}

impl StrengthAggregator {
    pub fn new(calculator: Arc<PercentChangeCalculator>, currencies: Vec<String>) -> Self {
        Self { calculator, currencies }
    }

    pub fn currencies(&self) -> &[String] {
        &self.currencies
    }

    /// Computes percent changes for every instrument, then aggregates.
    /// Instruments that do not parse as a tracked pair are skipped.
    pub fn compute_all<'a>(
        &self,
        instruments: impl IntoIterator<Item = &'a str>,
    ) -> BTreeMap<String, PercentChangeResult> {
        let changes: Vec<(String, PercentChangeResult)> = instruments
            .into_iter()
            .map(|id| (id.to_string(), self.calculator.compute(id)))
            .collect();
        aggregate(&self.currencies, &changes)
    }
}

/// Signed contributions of one instrument: `(base, +pct)` and `(quote, -pct)`.
/// `None` when the id is malformed or either leg is not tracked.
pub fn contributions(
    currencies: &[String],
    instrument: &str,
    changes: &PercentChangeResult,
) -> Option<[(String, PercentChangeResult); 2]> {
    let (base, quote) = split_pair(instrument)?;
    if !currencies.contains(&base) || !currencies.contains(&quote) {
        return None;
    }
    let mut negated = PercentChangeResult::default();
    for c in &changes.changes {
        negated.insert(&c.label, -c.pct);
    }
    Some([(base, changes.clone()), (quote, negated)])
}

/// Pure aggregation over precomputed percent changes.
pub fn aggregate(
    currencies: &[String],
    changes: &[(String, PercentChangeResult)],
) -> BTreeMap<String, PercentChangeResult> {
    // currency → [(label, sum, count)] in first-seen label order
    let mut acc: BTreeMap<String, Vec<(String, f64, usize)>> = BTreeMap::new();
    let mut skipped = 0usize;

    for (instrument, result) in changes {
        let Some(legs) = contributions(currencies, instrument, result) else {
            skipped += 1;
            debug!(instrument = %instrument, "strength: skipping unrecognised instrument");
            continue;
        };
        for (currency, signed) in legs {
            let slots = acc.entry(currency).or_default();
            for c in signed.changes {
                match slots.iter_mut().find(|(label, _, _)| *label == c.label) {
                    Some((_, sum, n)) => {
                        *sum += c.pct;
                        *n += 1;
                    }
                    None => slots.push((c.label, c.pct, 1)),
                }
            }
        }
    }

    if skipped > 0 {
        debug!(skipped, "strength: instruments skipped this pass");
    }

    acc.into_iter()
        .filter_map(|(currency, slots)| {
            let mut result = PercentChangeResult::default();
            for (label, sum, n) in slots {
                result.insert(&label, sum / n as f64);
            }
            (!result.is_empty()).then_some((currency, result))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn currencies(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    fn result(pairs: &[(&str, f64)]) -> PercentChangeResult {
        let mut r = PercentChangeResult::default();
        for (label, pct) in pairs {
            r.insert(label, *pct);
        }
        r
    }

    #[test]
    fn eur_strength_averages_base_and_quote_legs() {
        let ccy = currencies(&["EUR", "GBP", "USD"]);
        let changes = vec![
            ("EURUSD".to_string(), result(&[("1h", 0.5)])),
            ("GBPUSD".to_string(), result(&[("1h", 0.5)])),
        ];
        let s = aggregate(&ccy, &changes);
        assert_eq!(s["USD"].get("1h"), Some(-0.5));
        assert_eq!(s["EUR"].get("1h"), Some(0.5));
        assert_eq!(s["GBP"].get("1h"), Some(0.5));
    }

    #[test]
    fn base_and_quote_contributions_are_exact_negations() {
        let ccy = currencies(&["AAA", "BBB"]);
        let changes = result(&[("15m", 0.123), ("1h", -0.456), ("24h", 3.0)]);
        let [(base, b), (quote, q)] = contributions(&ccy, "AAABBB", &changes).unwrap();
        assert_eq!((base.as_str(), quote.as_str()), ("AAA", "BBB"));
        for c in &b.changes {
            assert_eq!(q.get(&c.label), Some(-c.pct));
        }

        let s = aggregate(&ccy, &[("AAA/BBB".to_string(), changes)]);
        for c in &s["AAA"].changes {
            assert_eq!(s["BBB"].get(&c.label), Some(-c.pct));
        }
    }

    #[test]
    fn windows_are_averaged_independently() {
        let ccy = currencies(&["EUR", "USD", "JPY"]);
        let changes = vec![
            ("EURUSD".to_string(), result(&[("1h", 1.0), ("4h", 2.0)])),
            ("USDJPY".to_string(), result(&[("1h", 0.5)])),
        ];
        let s = aggregate(&ccy, &changes);
        // USD: 1h = mean(-1.0, +0.5); 4h only from EURUSD
        assert_eq!(s["USD"].get("1h"), Some(-0.25));
        assert_eq!(s["USD"].get("4h"), Some(-2.0));
        assert_eq!(s["JPY"].get("4h"), None);
    }

    #[test]
    fn malformed_and_untracked_instruments_are_skipped() {
        let ccy = currencies(&["EUR", "USD"]);
        let changes = vec![
            ("EURUSD".to_string(), result(&[("1h", 1.0)])),
            ("XAUUSD".to_string(), result(&[("1h", 9.0)])),
            ("US30".to_string(), result(&[("1h", 9.0)])),
            ("???".to_string(), result(&[("1h", 9.0)])),
        ];
        let s = aggregate(&ccy, &changes);
        assert_eq!(s["USD"].get("1h"), Some(-1.0));
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn currencies_without_contributors_are_omitted() {
        let ccy = currencies(&["EUR", "USD", "CHF"]);
        let s = aggregate(&ccy, &[("EURUSD".to_string(), PercentChangeResult::default())]);
        assert!(s.is_empty());
    }

    #[test]
    fn compute_all_reads_through_the_store() {
        use crate::state::TickHistoryStore;
        use crate::types::WindowSpec;

        let store = TickHistoryStore::new(3_600_000);
        store.add("EURUSD", 0, 1.0, 1.0).unwrap();
        store.add("EURUSD", 900_000, 1.01, 1.01).unwrap();
        let calc = Arc::new(PercentChangeCalculator::new(
            store.clone(),
            vec![WindowSpec::parse("15m").unwrap()],
        ));
        let agg = StrengthAggregator::new(calc, currencies(&["EUR", "USD"]));
        let ids = store.known_instruments();
        let s = agg.compute_all(ids.iter().map(String::as_str));
        assert!((s["EUR"].get("15m").unwrap() - 1.0).abs() < 1e-9);
        assert!((s["USD"].get("15m").unwrap() + 1.0).abs() < 1e-9);
    }
}

//! Content fingerprints for record sequences.
//!
//! A BLAKE3 hash over the canonical byte encoding of every field, in order.
//! Two runs over unchanged upstream data must produce the same hash; any
//! difference in a value, a label or the ordering changes it.

use crate::domain::SignalRecord;

/// Hex-encoded BLAKE3 hash of a record sequence.
pub fn records_hash(records: &[SignalRecord]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(records.len() as u64).to_le_bytes());
    for r in records {
        hasher.update(&r.timestamp.timestamp_millis().to_le_bytes());
        hash_f64(&mut hasher, r.price);
        hash_opt(&mut hasher, r.volatility_index);
        hash_opt(&mut hasher, r.market_index);
        hash_f64(&mut hasher, r.price_change_pct);
        hash_opt(&mut hasher, r.market_change_pct);
        hash_f64(&mut hasher, r.beta);
        hash_opt(&mut hasher, r.buy_threshold);
        hash_opt(&mut hasher, r.sell_threshold);
        hasher.update(r.signal.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(r.trade_quality.as_str().as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

fn hash_f64(hasher: &mut blake3::Hasher, v: f64) {
    hasher.update(&v.to_bits().to_le_bytes());
}

fn hash_opt(hasher: &mut blake3::Hasher, v: Option<f64>) {
    match v {
        Some(v) => {
            hasher.update(&[1]);
            hash_f64(hasher, v);
        }
        None => {
            hasher.update(&[0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{millis_to_timestamp, MarketObservation};
    use crate::signal::SignalEngine;

    fn records() -> Vec<SignalRecord> {
        let obs: Vec<MarketObservation> = [100.0, 101.0, 99.0, 99.0]
            .iter()
            .zip([1000.0, 1005.0, 1000.0, 1000.0])
            .enumerate()
            .map(|(i, (&p, m))| {
                MarketObservation::new(
                    millis_to_timestamp(i as i64 * 3_600_000).unwrap(),
                    p,
                    Some(15.0),
                    Some(m),
                )
            })
            .collect();
        SignalEngine::default().compute(&obs)
    }

    #[test]
    fn stable_across_runs() {
        assert_eq!(records_hash(&records()), records_hash(&records()));
        assert_eq!(records_hash(&records()).len(), 64);
    }

    #[test]
    fn sensitive_to_labels_and_missing_values() {
        let base = records_hash(&records());

        let mut relabeled = records();
        relabeled[0].trade_quality = crate::domain::TradeQuality::Neutral;
        assert_ne!(records_hash(&relabeled), base);

        let mut missing = records();
        missing[1].market_change_pct = None;
        assert_ne!(records_hash(&missing), base);
    }

    #[test]
    fn empty_sequence_has_a_hash() {
        assert_ne!(records_hash(&[]), records_hash(&records()));
    }
}

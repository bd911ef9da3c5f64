//! Property tests for signal engine invariants.
//!
//! Uses proptest to verify:
//! 1. Beta bounds: always within the clip, exactly neutral on a zero or missing market move
//! 2. Purity: each signal depends only on its own move and thresholds
//! 3. Widening: higher volatility never fires more signals at the same moves
//! 4. Idempotence: same observations, same records, same hash
//! 5. Labelling: exactly one unevaluable record, always the last

use proptest::prelude::*;
use fanlab_core::domain::{millis_to_timestamp, MarketObservation, Signal, TradeQuality};
use fanlab_core::fingerprint::records_hash;
use fanlab_core::signal::{classify, SignalEngine};

const HOUR_MS: i64 = 3_600_000;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (1.0..1000.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_volatility() -> impl Strategy<Value = f64> {
    5.0..80.0_f64
}

fn arb_series(max_len: usize) -> impl Strategy<Value = Vec<(f64, Option<f64>, Option<f64>)>> {
    prop::collection::vec(
        (
            arb_price(),
            prop::option::weighted(0.9, arb_volatility()),
            prop::option::weighted(0.9, (3000.0..5000.0_f64)),
        ),
        2..max_len,
    )
}

fn observations(rows: &[(f64, Option<f64>, Option<f64>)]) -> Vec<MarketObservation> {
    rows.iter()
        .enumerate()
        .map(|(i, &(price, vol, market))| {
            MarketObservation::new(
                millis_to_timestamp(i as i64 * HOUR_MS).unwrap(),
                price,
                vol,
                market,
            )
        })
        .collect()
}

// ── 1. Beta bounds ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn beta_is_always_clipped(rows in arb_series(40)) {
        let records = SignalEngine::default().compute(&observations(&rows));
        for r in &records {
            prop_assert!(r.beta >= -3.0 && r.beta <= 3.0, "beta {} out of range", r.beta);
        }
    }

    #[test]
    fn beta_is_neutral_without_market_move(pc in -20.0..20.0_f64) {
        let engine = SignalEngine::default();
        prop_assert_eq!(engine.beta(pc, Some(0.0)), 1.0);
        prop_assert_eq!(engine.beta(pc, None), 1.0);
    }

    #[test]
    fn flat_market_gives_neutral_beta(prices in prop::collection::vec(arb_price(), 2..20)) {
        let rows: Vec<_> = prices.iter().map(|&p| (p, Some(15.0), Some(4000.0))).collect();
        let records = SignalEngine::default().compute(&observations(&rows));
        prop_assert!(records.iter().all(|r| r.beta == 1.0));
    }
}

// ── 2. Purity ────────────────────────────────────────────────────────

proptest! {
    /// Every record's signal is reproduced by classify() from its own fields.
    #[test]
    fn signal_is_a_function_of_move_and_thresholds(rows in arb_series(40)) {
        let records = SignalEngine::default().compute(&observations(&rows));
        for r in &records {
            prop_assert_eq!(r.signal, classify(r.price_change_pct, r.buy_threshold, r.sell_threshold));
        }
    }

    /// Changing an earlier observation does not change signals two steps later.
    #[test]
    fn no_state_carried_across_timestamps(rows in arb_series(30), bump in 1.0..50.0_f64) {
        prop_assume!(rows.len() >= 4);
        let engine = SignalEngine::default();
        let base = engine.compute(&observations(&rows));

        let mut changed = rows.clone();
        changed[0].0 += bump;
        let other = engine.compute(&observations(&changed));

        for (a, b) in base.iter().zip(&other).skip(1) {
            prop_assert_eq!(a.signal, b.signal);
            prop_assert_eq!(a.price_change_pct, b.price_change_pct);
        }
    }
}

// ── 3. Widening ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn higher_volatility_never_fires_more(
        prices in prop::collection::vec(arb_price(), 2..40),
        low in arb_volatility(),
        extra in 0.0..40.0_f64,
    ) {
        let engine = SignalEngine::default();
        let at = |vol: f64| {
            let rows: Vec<_> = prices.iter().map(|&p| (p, Some(vol), Some(4000.0))).collect();
            engine.compute(&observations(&rows))
        };
        let calm = at(low);
        let turbulent = at(low + extra);

        for (c, t) in calm.iter().zip(&turbulent) {
            // a signal in the turbulent run implies the same signal in the calm run
            if t.signal != Signal::Hold {
                prop_assert_eq!(c.signal, t.signal);
            }
        }
        let trades = |rs: &[fanlab_core::domain::SignalRecord]| rs.iter().filter(|r| r.signal.is_trade()).count();
        prop_assert!(trades(&turbulent) <= trades(&calm));
    }
}

// ── 4. Idempotence and labelling ─────────────────────────────────────

proptest! {
    #[test]
    fn recompute_is_identical(rows in arb_series(40)) {
        let obs = observations(&rows);
        let engine = SignalEngine::default();
        let a = engine.compute(&obs);
        let b = engine.compute(&obs);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(records_hash(&a), records_hash(&b));
    }

    #[test]
    fn only_last_record_is_unevaluable(rows in arb_series(40)) {
        let records = SignalEngine::default().compute(&observations(&rows));
        prop_assert_eq!(records.len(), rows.len() - 1);
        let (last, rest) = records.split_last().unwrap();
        prop_assert_eq!(last.trade_quality, TradeQuality::Unevaluable);
        prop_assert!(rest.iter().all(|r| r.trade_quality.is_evaluable()));
        for r in rest.iter().filter(|r| r.signal == Signal::Hold) {
            prop_assert_eq!(r.trade_quality, TradeQuality::Neutral);
        }
    }
}

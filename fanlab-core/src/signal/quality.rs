//! Lookahead trade-quality labelling and trade P&L.
//!
//! Shared by the per-partition signal pass and the portfolio-level
//! reconciliation pass so both apply exactly the same rule.

use crate::domain::{Signal, SignalRecord, TradeQuality};

/// Label a signal against the next period's price move.
///
/// `next_change_pct` is `None` when there is no next period; that record is
/// unevaluable regardless of its signal.
pub fn label(signal: Signal, next_change_pct: Option<f64>) -> TradeQuality {
    let Some(next) = next_change_pct else {
        return TradeQuality::Unevaluable;
    };
    match signal {
        Signal::Buy if next > 0.0 => TradeQuality::Good,
        Signal::Buy if next < 0.0 => TradeQuality::Bad,
        Signal::Sell if next < 0.0 => TradeQuality::Good,
        Signal::Sell if next > 0.0 => TradeQuality::Bad,
        _ => TradeQuality::Neutral,
    }
}

/// P&L of acting on `signal` given the realized next move, in percent.
///
/// Hold contributes zero. A trade with no next period has no P&L.
pub fn trade_pnl(signal: Signal, next_change_pct: Option<f64>) -> Option<f64> {
    match signal {
        Signal::Hold => Some(0.0),
        Signal::Buy => next_change_pct,
        Signal::Sell => next_change_pct.map(|n| -n),
    }
}

/// Relabel a time-ordered record sequence of a single instrument in place.
pub fn assign_trade_quality(records: &mut [SignalRecord]) {
    let n = records.len();
    for i in 0..n {
        let next = records.get(i + 1).map(|r| r.price_change_pct);
        records[i].trade_quality = label(records[i].signal, next);
    }
}

/// Next-period move for each record, `None` for the last one.
pub fn next_changes(records: &[SignalRecord]) -> Vec<Option<f64>> {
    (0..records.len())
        .map(|i| records.get(i + 1).map(|r| r.price_change_pct))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_then_up_is_good() {
        assert_eq!(label(Signal::Buy, Some(0.4)), TradeQuality::Good);
        assert_eq!(label(Signal::Buy, Some(-0.4)), TradeQuality::Bad);
    }

    #[test]
    fn sell_then_down_is_good() {
        assert_eq!(label(Signal::Sell, Some(-1.0)), TradeQuality::Good);
        assert_eq!(label(Signal::Sell, Some(1.0)), TradeQuality::Bad);
    }

    #[test]
    fn flat_next_move_and_hold_are_neutral() {
        assert_eq!(label(Signal::Buy, Some(0.0)), TradeQuality::Neutral);
        assert_eq!(label(Signal::Hold, Some(3.0)), TradeQuality::Neutral);
    }

    #[test]
    fn no_next_period_is_unevaluable_even_for_hold() {
        assert_eq!(label(Signal::Hold, None), TradeQuality::Unevaluable);
        assert_eq!(label(Signal::Buy, None), TradeQuality::Unevaluable);
    }

    #[test]
    fn pnl_signs_follow_direction() {
        assert_eq!(trade_pnl(Signal::Buy, Some(2.0)), Some(2.0));
        assert_eq!(trade_pnl(Signal::Sell, Some(2.0)), Some(-2.0));
        assert_eq!(trade_pnl(Signal::Hold, Some(2.0)), Some(0.0));
        assert_eq!(trade_pnl(Signal::Sell, None), None);
    }
}

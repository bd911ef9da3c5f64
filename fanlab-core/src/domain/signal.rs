//! Trading signals, trade-quality labels, and the per-timestamp signal record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::observation::Timestamp;

/// Trading signal emitted for one timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::Hold => "hold",
        }
    }

    /// Buy and sell are trades; hold is not.
    pub fn is_trade(self) -> bool {
        !matches!(self, Signal::Hold)
    }
}

/// Lookahead label comparing a signal with the next period's realized move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeQuality {
    Good,
    Bad,
    Neutral,
    /// No next period exists (last timestamp of a series).
    Unevaluable,
}

impl TradeQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeQuality::Good => "good",
            TradeQuality::Bad => "bad",
            TradeQuality::Neutral => "neutral",
            TradeQuality::Unevaluable => "unevaluable",
        }
    }

    pub fn is_evaluable(self) -> bool {
        !matches!(self, TradeQuality::Unevaluable)
    }
}

/// Failed to parse a persisted signal or quality label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} label '{value}'")]
pub struct ParseLabelError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Signal {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(Signal::Buy),
            "sell" => Ok(Signal::Sell),
            "hold" => Ok(Signal::Hold),
            other => Err(ParseLabelError {
                kind: "signal",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for TradeQuality {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "good" => Ok(TradeQuality::Good),
            "bad" => Ok(TradeQuality::Bad),
            "neutral" => Ok(TradeQuality::Neutral),
            "unevaluable" => Ok(TradeQuality::Unevaluable),
            other => Err(ParseLabelError {
                kind: "trade quality",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TradeQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived signal state for one timestamp of one instrument.
///
/// The raw inputs (`price`, `volatility_index`, `market_index`) travel with
/// the record so that a persisted partition can be re-evaluated without
/// going back to the market context store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub timestamp: Timestamp,
    pub price: f64,
    pub volatility_index: Option<f64>,
    pub market_index: Option<f64>,
    pub price_change_pct: f64,
    pub market_change_pct: Option<f64>,
    pub beta: f64,
    pub buy_threshold: Option<f64>,
    pub sell_threshold: Option<f64>,
    pub signal: Signal,
    pub trade_quality: TradeQuality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_back() {
        for s in [Signal::Buy, Signal::Sell, Signal::Hold] {
            assert_eq!(s.as_str().parse::<Signal>().unwrap(), s);
        }
        for q in [
            TradeQuality::Good,
            TradeQuality::Bad,
            TradeQuality::Neutral,
            TradeQuality::Unevaluable,
        ] {
            assert_eq!(q.as_str().parse::<TradeQuality>().unwrap(), q);
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        let err = "strong_buy".parse::<Signal>().unwrap_err();
        assert_eq!(err.kind, "signal");
    }

    #[test]
    fn hold_is_not_a_trade() {
        assert!(Signal::Buy.is_trade());
        assert!(Signal::Sell.is_trade());
        assert!(!Signal::Hold.is_trade());
    }
}

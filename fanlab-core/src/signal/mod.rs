//! Signal engine: per-timestamp signals, beta, and lookahead trade quality.
//!
//! Pure: observations in, records out. No I/O, no clock, no randomness, no
//! state carried between timestamps other than the previous observation
//! needed for the percentage change.

pub mod quality;

use serde::{Deserialize, Serialize};

use crate::domain::{MarketObservation, Signal, SignalRecord, TradeQuality};

pub use quality::{assign_trade_quality, label, next_changes, trade_pnl};

/// Tunable constants of the volatility-adjusted signal model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalParams {
    /// Volatility-index level treated as a calm market (multiplier 1.0).
    pub baseline_volatility: f64,
    /// Buy/sell trigger in percent at baseline volatility.
    pub threshold_pct: f64,
    /// Beta is clipped to `[-beta_clip, beta_clip]`.
    pub beta_clip: f64,
    /// Beta used when the market move is zero or missing.
    pub neutral_beta: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            baseline_volatility: 15.0,
            threshold_pct: 0.5,
            beta_clip: 3.0,
            neutral_beta: 1.0,
        }
    }
}

/// Computes [`SignalRecord`]s from an instrument's aligned observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalEngine {
    params: SignalParams,
}

impl SignalEngine {
    pub fn new(params: SignalParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SignalParams {
        &self.params
    }

    /// One record per observation after the first, in the same order.
    ///
    /// Observations must already be sorted strictly ascending by timestamp
    /// with positive prices (the market context store guarantees both).
    /// The last record is labelled [`TradeQuality::Unevaluable`].
    pub fn compute(&self, observations: &[MarketObservation]) -> Vec<SignalRecord> {
        let mut records: Vec<SignalRecord> = observations
            .windows(2)
            .map(|pair| self.record(&pair[0], &pair[1]))
            .collect();
        assign_trade_quality(&mut records);
        records
    }

    fn record(&self, prev: &MarketObservation, cur: &MarketObservation) -> SignalRecord {
        let price_change_pct = pct_change(prev.price, cur.price);
        let market_change_pct = match (prev.market_index, cur.market_index) {
            (Some(p), Some(c)) if p != 0.0 => Some(pct_change(p, c)),
            _ => None,
        };
        let beta = self.beta(price_change_pct, market_change_pct);
        let (buy_threshold, sell_threshold) = match self.thresholds(cur.volatility_index) {
            Some((buy, sell)) => (Some(buy), Some(sell)),
            None => (None, None),
        };
        let signal = classify(price_change_pct, buy_threshold, sell_threshold);

        SignalRecord {
            timestamp: cur.timestamp,
            price: cur.price,
            volatility_index: cur.volatility_index,
            market_index: cur.market_index,
            price_change_pct,
            market_change_pct,
            beta,
            buy_threshold,
            sell_threshold,
            signal,
            trade_quality: TradeQuality::Unevaluable,
        }
    }

    /// Ratio of instrument move to market move, clipped.
    pub fn beta(&self, price_change_pct: f64, market_change_pct: Option<f64>) -> f64 {
        match market_change_pct {
            Some(m) if m != 0.0 && m.is_finite() => {
                let raw = price_change_pct / m;
                if raw.is_nan() {
                    self.params.neutral_beta
                } else {
                    raw.clamp(-self.params.beta_clip, self.params.beta_clip)
                }
            }
            _ => self.params.neutral_beta,
        }
    }

    /// `(buy, sell)` thresholds scaled by the volatility multiplier.
    ///
    /// `None` when the volatility index is missing at this timestamp.
    pub fn thresholds(&self, volatility_index: Option<f64>) -> Option<(f64, f64)> {
        let vol = volatility_index?;
        let multiplier = vol / self.params.baseline_volatility;
        let buy = self.params.threshold_pct * multiplier;
        Some((buy, -buy))
    }
}

/// Percentage change from `prev` to `cur`.
pub fn pct_change(prev: f64, cur: f64) -> f64 {
    (cur - prev) / prev * 100.0
}

/// Map a price move to a signal. Missing thresholds mean hold.
pub fn classify(price_change_pct: f64, buy: Option<f64>, sell: Option<f64>) -> Signal {
    match (buy, sell) {
        (Some(_), Some(sell)) if price_change_pct < sell => Signal::Sell,
        (Some(buy), Some(_)) if price_change_pct > buy => Signal::Buy,
        _ => Signal::Hold,
    }
}

//! Market observations: one instrument price joined with market context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamps are UTC instants at millisecond resolution.
pub type Timestamp = DateTime<Utc>;

/// Convert epoch milliseconds to a [`Timestamp`]. `None` when out of range.
pub fn millis_to_timestamp(millis: i64) -> Option<Timestamp> {
    DateTime::from_timestamp_millis(millis)
}

/// One row of an instrument's aligned series.
///
/// `volatility_index` and `market_index` come from a left join onto the
/// instrument's own timestamp index. A timestamp the side series does not
/// cover is `None`, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketObservation {
    pub timestamp: Timestamp,
    pub price: f64,
    pub volatility_index: Option<f64>,
    pub market_index: Option<f64>,
}

impl MarketObservation {
    pub fn new(
        timestamp: Timestamp,
        price: f64,
        volatility_index: Option<f64>,
        market_index: Option<f64>,
    ) -> Self {
        Self {
            timestamp,
            price,
            volatility_index,
            market_index,
        }
    }

    /// True when both side series are present for this timestamp.
    pub fn has_full_context(&self) -> bool {
        self.volatility_index.is_some() && self.market_index.is_some()
    }
}

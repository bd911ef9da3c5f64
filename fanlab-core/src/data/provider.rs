//! Live market-data provider seam.
//!
//! A provider fetches a close-price series for one symbol over a date range.
//! Implementations: `YahooProvider` (HTTP); tests use in-memory mocks.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Close price at an instant (epoch milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosePoint {
    pub timestamp_ms: i64,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Hourly,
    Daily,
}

impl Interval {
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Hourly => "1h",
            Interval::Daily => "1d",
        }
    }
}

impl std::str::FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" | "hourly" => Ok(Interval::Hourly),
            "1d" | "daily" => Ok(Interval::Daily),
            other => Err(format!("unknown interval '{other}' (expected 1h or 1d)")),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider")]
    RateLimited,

    #[error("HTTP {status} for {symbol}")]
    Http { status: u16, symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::NetworkUnreachable(_) | ProviderError::RateLimited => true,
            ProviderError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Source of close-price series.
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Close prices for `symbol` in `[start, end]`, ascending.
    fn fetch_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<ClosePoint>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ProviderError::RateLimited.is_transient());
        assert!(ProviderError::Http {
            status: 503,
            symbol: "X".into()
        }
        .is_transient());
        assert!(!ProviderError::Http {
            status: 404,
            symbol: "X".into()
        }
        .is_transient());
        assert!(!ProviderError::SymbolNotFound { symbol: "X".into() }.is_transient());
    }

    #[test]
    fn interval_parse() {
        assert_eq!("1h".parse::<Interval>().unwrap(), Interval::Hourly);
        assert_eq!("daily".parse::<Interval>().unwrap(), Interval::Daily);
        assert!("5m".parse::<Interval>().is_err());
    }
}

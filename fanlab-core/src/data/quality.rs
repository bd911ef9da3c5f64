//! Data quality errors raised while assembling instrument series.

use crate::domain::Timestamp;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataQualityError {
    #[error("dataset '{dataset}' has {count} duplicate timestamp(s) in series '{series}'")]
    DuplicateTimestamps {
        dataset: String,
        series: String,
        count: usize,
    },

    #[error("instrument '{instrument}' has invalid price {price} at {timestamp}")]
    InvalidPrice {
        instrument: String,
        timestamp: Timestamp,
        price: f64,
    },

    #[error("dataset '{dataset}' has a null or out-of-range timestamp at row {row}")]
    InvalidTimestamp { dataset: String, row: usize },
}

/// Number of timestamps that repeat an earlier one.
pub fn count_duplicates<I: IntoIterator<Item = i64>>(timestamps: I) -> usize {
    let mut seen = std::collections::HashSet::new();
    timestamps.into_iter().filter(|t| !seen.insert(*t)).count()
}

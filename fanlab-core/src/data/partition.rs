//! Partitioner: the ordered instrument universe of a run.

use super::frame;
use super::store::DatasetStore;
use crate::domain::Instrument;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("dataset '{dataset}' could not be read: {reason}")]
    DatasetNotFound { dataset: String, reason: String },

    #[error("dataset '{dataset}' has no instrument columns")]
    EmptyDataset { dataset: String },
}

/// Instruments selected for a run, in stored column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub instruments: Vec<Instrument>,
    /// Distinct timestamps in the holdings dataset.
    pub timestamp_count: usize,
    /// Instrument columns before the cap was applied.
    pub available: usize,
}

/// Derives the instrument list from the holdings dataset.
///
/// Every column other than the timestamp column and the reserved market
/// column is an instrument.
pub struct Partitioner {
    store: Arc<dyn DatasetStore>,
    dataset: String,
    timestamp_column: String,
    market_column: String,
}

impl Partitioner {
    pub fn new(
        store: Arc<dyn DatasetStore>,
        dataset: impl Into<String>,
        timestamp_column: impl Into<String>,
        market_column: impl Into<String>,
    ) -> Self {
        Self {
            store,
            dataset: dataset.into(),
            timestamp_column: timestamp_column.into(),
            market_column: market_column.into(),
        }
    }

    /// The first `limit` instruments. `None` or `Some(0)` selects all.
    pub fn partition(&self, limit: Option<usize>) -> Result<Partition, PartitionError> {
        let not_found = |reason: String| PartitionError::DatasetNotFound {
            dataset: self.dataset.clone(),
            reason,
        };

        let df = self.store.read(&self.dataset).map_err(|e| not_found(e.to_string()))?;

        let mut instruments: Vec<Instrument> = frame::column_names(&df)
            .into_iter()
            .filter(|name| *name != self.timestamp_column && *name != self.market_column)
            .map(Instrument::from)
            .collect();

        if instruments.is_empty() {
            return Err(PartitionError::EmptyDataset {
                dataset: self.dataset.clone(),
            });
        }

        let timestamp_count = frame::timestamp_millis(&df, &self.timestamp_column)
            .map_err(|e| not_found(e.to_string()))?
            .into_iter()
            .flatten()
            .collect::<HashSet<_>>()
            .len();

        let available = instruments.len();
        if let Some(n) = limit.filter(|n| *n > 0) {
            instruments.truncate(n);
        }

        Ok(Partition {
            instruments,
            timestamp_count,
            available,
        })
    }
}

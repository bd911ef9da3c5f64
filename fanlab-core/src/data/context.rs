//! Market Context Store: one instrument's prices left-joined with the
//! volatility index and the broad-market index.
//!
//! Three reads per load (holdings, volatility, market). The instrument's own
//! timestamps drive the join; a side series with no value at a timestamp
//! yields `None` for that field, never zero.

use super::frame::{self, FrameError};
use super::quality::{count_duplicates, DataQualityError};
use super::retry::RetryPolicy;
use super::store::{DatasetStore, StoreError};
use crate::domain::{millis_to_timestamp, Instrument, MarketObservation};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Dataset and column names of the three input series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetLayout {
    pub holdings: String,
    pub volatility: String,
    pub market: String,
    pub timestamp_column: String,
    /// Reserved market column in the holdings dataset and the value column
    /// of the market dataset.
    pub market_column: String,
    pub volatility_column: String,
}

impl Default for DatasetLayout {
    fn default() -> Self {
        Self {
            holdings: "spx_holdings_hourly".into(),
            volatility: "vix_hourly".into(),
            market: "spx_hourly".into(),
            timestamp_column: "timestamp".into(),
            market_column: "SPX".into(),
            volatility_column: "VIX".into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("dataset '{dataset}' not found: {reason}")]
    DatasetNotFound { dataset: String, reason: String },

    #[error("instrument '{0}' is not a column of the holdings dataset")]
    InstrumentNotFound(String),

    #[error("market data unavailable: {series} series in '{dataset}' {reason}")]
    MarketDataUnavailable {
        series: &'static str,
        dataset: String,
        reason: String,
    },

    #[error("reading '{dataset}' failed after {attempts} attempt(s): {source}")]
    Transient {
        dataset: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("dataset '{dataset}' is malformed: {reason}")]
    Malformed { dataset: String, reason: String },

    #[error(transparent)]
    DataQuality(#[from] DataQualityError),
}

impl ContextError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ContextError::Transient { .. })
    }
}

/// Read-only access to aligned market context.
#[derive(Clone)]
pub struct MarketContextStore {
    store: Arc<dyn DatasetStore>,
    layout: DatasetLayout,
    retry: RetryPolicy,
    duplicate_tolerance: usize,
}

impl MarketContextStore {
    pub fn new(store: Arc<dyn DatasetStore>, layout: DatasetLayout) -> Self {
        Self {
            store,
            layout,
            retry: RetryPolicy::default(),
            duplicate_tolerance: 0,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Duplicated instrument timestamps accepted per load. Within the
    /// tolerance the first stored row for a timestamp is kept.
    pub fn with_duplicate_tolerance(mut self, tolerance: usize) -> Self {
        self.duplicate_tolerance = tolerance;
        self
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    /// Observations for one instrument, strictly ascending by timestamp.
    pub fn load(&self, instrument: &Instrument) -> Result<Vec<MarketObservation>, ContextError> {
        let prices = self.instrument_series(instrument)?;

        let volatility = self.side_series(
            "volatility",
            &self.layout.volatility,
            &self.layout.volatility_column,
        )?;
        let market = self.side_series("market", &self.layout.market, &self.layout.market_column)?;

        let mut observations = Vec::with_capacity(prices.len());
        for (millis, price) in prices {
            let Some(timestamp) = millis_to_timestamp(millis) else {
                return Err(DataQualityError::InvalidTimestamp {
                    dataset: self.layout.holdings.clone(),
                    row: observations.len(),
                }
                .into());
            };
            observations.push(MarketObservation::new(
                timestamp,
                price,
                volatility.get(&millis).copied().flatten(),
                market.get(&millis).copied().flatten(),
            ));
        }

        debug!(
            instrument = %instrument,
            observations = observations.len(),
            "market context loaded"
        );
        Ok(observations)
    }

    fn read(&self, dataset: &str) -> Result<DataFrame, ContextError> {
        self.retry
            .run(dataset, || self.store.read(dataset), StoreError::is_transient)
            .map_err(|(err, attempts)| match err {
                StoreError::NotFound { location, .. } => ContextError::DatasetNotFound {
                    dataset: dataset.to_string(),
                    reason: format!("no file at {location}"),
                },
                err @ StoreError::Io { .. } => ContextError::Transient {
                    dataset: dataset.to_string(),
                    attempts,
                    source: err,
                },
                StoreError::Format { reason, .. } => ContextError::Malformed {
                    dataset: dataset.to_string(),
                    reason,
                },
            })
    }

    /// `(millis, price)` rows where the instrument has a price, sorted.
    fn instrument_series(&self, instrument: &Instrument) -> Result<Vec<(i64, f64)>, ContextError> {
        let dataset = &self.layout.holdings;
        let df = self.read(dataset)?;

        let prices = match frame::f64_values(&df, instrument.as_str()) {
            Ok(prices) => prices,
            Err(FrameError::MissingColumn(_)) => {
                return Err(ContextError::InstrumentNotFound(instrument.to_string()))
            }
            Err(e) => return Err(malformed(dataset, e)),
        };
        let timestamps =
            frame::timestamp_millis(&df, &self.layout.timestamp_column).map_err(|e| malformed(dataset, e))?;

        let mut rows = Vec::with_capacity(prices.len());
        for (row, (ts, price)) in timestamps.into_iter().zip(prices).enumerate() {
            let Some(price) = price else { continue };
            let Some(ts) = ts else {
                return Err(DataQualityError::InvalidTimestamp {
                    dataset: dataset.clone(),
                    row,
                }
                .into());
            };
            if !price.is_finite() || price <= 0.0 {
                return Err(DataQualityError::InvalidPrice {
                    instrument: instrument.to_string(),
                    timestamp: millis_to_timestamp(ts).unwrap_or_default(),
                    price,
                }
                .into());
            }
            rows.push((ts, price));
        }

        let duplicates = count_duplicates(rows.iter().map(|(t, _)| *t));
        if duplicates > self.duplicate_tolerance {
            return Err(DataQualityError::DuplicateTimestamps {
                dataset: dataset.clone(),
                series: instrument.to_string(),
                count: duplicates,
            }
            .into());
        }

        // stable: rows sharing a timestamp keep their stored order
        rows.sort_by_key(|(t, _)| *t);
        if duplicates > 0 {
            warn!(
                instrument = %instrument,
                duplicates,
                tolerance = self.duplicate_tolerance,
                "dropping tolerated duplicate timestamps, first row wins"
            );
            rows.dedup_by_key(|(t, _)| *t);
        }
        Ok(rows)
    }

    /// Side series keyed by timestamp. First occurrence of a timestamp wins.
    fn side_series(
        &self,
        series: &'static str,
        dataset: &str,
        column: &str,
    ) -> Result<HashMap<i64, Option<f64>>, ContextError> {
        let unavailable = |reason: String| ContextError::MarketDataUnavailable {
            series,
            dataset: dataset.to_string(),
            reason,
        };

        let df = match self.read(dataset) {
            Ok(df) => df,
            Err(ContextError::DatasetNotFound { reason, .. }) => return Err(unavailable(reason)),
            Err(e) => return Err(e),
        };

        let values = match frame::f64_values(&df, column) {
            Ok(values) => values,
            Err(FrameError::MissingColumn(_)) => {
                return Err(unavailable(format!("has no column '{column}'")))
            }
            Err(e) => return Err(malformed(dataset, e)),
        };
        let timestamps = frame::timestamp_millis(&df, &self.layout.timestamp_column)
            .map_err(|e| malformed(dataset, e))?;

        if values.iter().all(Option::is_none) {
            return Err(unavailable("has no values".into()));
        }

        let mut by_time = HashMap::with_capacity(values.len());
        for (ts, value) in timestamps.into_iter().zip(values) {
            if let Some(ts) = ts {
                by_time.entry(ts).or_insert(value);
            }
        }
        Ok(by_time)
    }
}

fn malformed(dataset: &str, err: FrameError) -> ContextError {
    ContextError::Malformed {
        dataset: dataset.to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame::timestamp_column;
    use crate::data::store::ParquetStore;
    use polars::prelude::*;
    use std::env;
    use std::io;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);
    const HOUR: i64 = 3_600_000;

    fn temp_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("fanlab_context_test_{}_{id}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn write(store: &ParquetStore, name: &str, ts: Vec<i64>, cols: Vec<(&str, Vec<Option<f64>>)>) {
        let mut columns = vec![timestamp_column("timestamp", ts).unwrap()];
        for (col, values) in cols {
            columns.push(Column::new(col.into(), values));
        }
        store
            .write(name, &mut DataFrame::new(columns).unwrap())
            .unwrap();
    }

    fn context(dir: &PathBuf) -> MarketContextStore {
        let store: Arc<dyn DatasetStore> = Arc::new(ParquetStore::new(dir));
        MarketContextStore::new(store, DatasetLayout::default()).with_retry(RetryPolicy::none())
    }

    fn seed(dir: &PathBuf) -> ParquetStore {
        let store = ParquetStore::new(dir);
        write(
            &store,
            "spx_holdings_hourly",
            vec![2 * HOUR, 0, HOUR, 3 * HOUR],
            vec![
                ("AAPL", vec![Some(102.0), Some(100.0), Some(101.0), None]),
                ("SPX", vec![Some(4000.0); 4]),
            ],
        );
        write(
            &store,
            "vix_hourly",
            vec![0, HOUR, HOUR],
            vec![("VIX", vec![Some(15.0), Some(16.0), Some(99.0)])],
        );
        write(
            &store,
            "spx_hourly",
            vec![0, 2 * HOUR],
            vec![("SPX", vec![Some(4000.0), Some(4010.0)])],
        );
        store
    }

    #[test]
    fn left_join_keeps_missing_context_explicit() {
        let dir = temp_dir();
        seed(&dir);
        let obs = context(&dir).load(&Instrument::new("AAPL")).unwrap();

        assert_eq!(obs.len(), 3);
        let millis: Vec<i64> = obs.iter().map(|o| o.timestamp.timestamp_millis()).collect();
        assert_eq!(millis, vec![0, HOUR, 2 * HOUR]);
        assert_eq!(obs[0].volatility_index, Some(15.0));
        // first occurrence of a duplicated side timestamp wins
        assert_eq!(obs[1].volatility_index, Some(16.0));
        assert_eq!(obs[1].market_index, None);
        assert_eq!(obs[2].volatility_index, None);
        assert_eq!(obs[2].market_index, Some(4010.0));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_instrument() {
        let dir = temp_dir();
        seed(&dir);
        let err = context(&dir).load(&Instrument::new("ZZZ")).unwrap_err();
        assert!(matches!(err, ContextError::InstrumentNotFound(ref i) if i == "ZZZ"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn absent_side_series_is_unavailable() {
        let dir = temp_dir();
        seed(&dir);
        std::fs::remove_file(dir.join("vix_hourly.parquet")).unwrap();
        let err = context(&dir).load(&Instrument::new("AAPL")).unwrap_err();
        assert!(matches!(
            err,
            ContextError::MarketDataUnavailable { series: "volatility", .. }
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn all_null_side_series_is_unavailable() {
        let dir = temp_dir();
        let store = seed(&dir);
        write(&store, "spx_hourly", vec![0], vec![("SPX", vec![None])]);
        let err = context(&dir).load(&Instrument::new("AAPL")).unwrap_err();
        assert!(matches!(
            err,
            ContextError::MarketDataUnavailable { series: "market", .. }
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn duplicate_instrument_timestamps_are_a_quality_error() {
        let dir = temp_dir();
        let store = seed(&dir);
        write(
            &store,
            "spx_holdings_hourly",
            vec![0, HOUR, HOUR],
            vec![("AAPL", vec![Some(1.0), Some(2.0), Some(3.0)])],
        );
        let err = context(&dir).load(&Instrument::new("AAPL")).unwrap_err();
        assert!(matches!(
            err,
            ContextError::DataQuality(DataQualityError::DuplicateTimestamps { count: 1, .. })
        ));
        assert!(!err.is_transient());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn non_positive_price_is_a_quality_error() {
        let dir = temp_dir();
        let store = seed(&dir);
        write(
            &store,
            "spx_holdings_hourly",
            vec![0, HOUR],
            vec![("AAPL", vec![Some(1.0), Some(0.0)])],
        );
        let err = context(&dir).load(&Instrument::new("AAPL")).unwrap_err();
        assert!(matches!(
            err,
            ContextError::DataQuality(DataQualityError::InvalidPrice { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_holdings_is_dataset_not_found() {
        let dir = temp_dir();
        let err = context(&dir).load(&Instrument::new("AAPL")).unwrap_err();
        assert!(matches!(err, ContextError::DatasetNotFound { .. }));
    }

    #[test]
    fn tolerated_duplicates_keep_the_first_row() {
        let dir = temp_dir();
        let store = seed(&dir);
        write(
            &store,
            "spx_holdings_hourly",
            vec![0, HOUR, HOUR],
            vec![("AAPL", vec![Some(1.0), Some(2.0), Some(3.0)])],
        );
        let obs = context(&dir)
            .with_duplicate_tolerance(1)
            .load(&Instrument::new("AAPL"))
            .unwrap();

        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].price, 1.0);
        assert_eq!(obs[1].timestamp.timestamp_millis(), HOUR);
        assert_eq!(obs[1].price, 2.0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn duplicates_beyond_tolerance_still_fail() {
        let dir = temp_dir();
        let store = seed(&dir);
        write(
            &store,
            "spx_holdings_hourly",
            vec![0, 0, HOUR, HOUR],
            vec![("AAPL", vec![Some(1.0), Some(1.5), Some(2.0), Some(3.0)])],
        );
        let err = context(&dir)
            .with_duplicate_tolerance(1)
            .load(&Instrument::new("AAPL"))
            .unwrap_err();
        assert!(matches!(
            err,
            ContextError::DataQuality(DataQualityError::DuplicateTimestamps { count: 2, .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    /// Fails reads of one dataset with an I/O error a fixed number of times.
    struct FlakyStore {
        inner: ParquetStore,
        failing: &'static str,
        failures_left: AtomicUsize,
        reads: AtomicUsize,
    }

    impl FlakyStore {
        fn new(dir: &PathBuf, failing: &'static str, failures: usize) -> Self {
            Self {
                inner: ParquetStore::new(dir),
                failing,
                failures_left: AtomicUsize::new(failures),
                reads: AtomicUsize::new(0),
            }
        }
    }

    impl DatasetStore for FlakyStore {
        fn read(&self, name: &str) -> Result<DataFrame, StoreError> {
            if name == self.failing {
                self.reads.fetch_add(1, Ordering::SeqCst);
                let left = self.failures_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                    return Err(StoreError::Io {
                        name: name.to_string(),
                        source: io::Error::new(io::ErrorKind::ConnectionReset, "connection reset"),
                    });
                }
            }
            self.inner.read(name)
        }

        fn write(&self, name: &str, df: &mut DataFrame) -> Result<String, StoreError> {
            self.inner.write(name, df)
        }

        fn list(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list()
        }

        fn locate(&self, name: &str) -> String {
            self.inner.locate(name)
        }

        fn exists(&self, name: &str) -> bool {
            self.inner.exists(name)
        }
    }

    fn flaky_context(store: &Arc<FlakyStore>) -> MarketContextStore {
        let shared: Arc<dyn DatasetStore> = store.clone();
        MarketContextStore::new(shared, DatasetLayout::default())
            .with_retry(RetryPolicy::new(3, Duration::ZERO))
    }

    #[test]
    fn transient_read_failure_is_retried() {
        let dir = temp_dir();
        seed(&dir);
        let store = Arc::new(FlakyStore::new(&dir, "spx_holdings_hourly", 1));

        let obs = flaky_context(&store).load(&Instrument::new("AAPL")).unwrap();
        assert_eq!(obs.len(), 3);
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn persistent_io_failure_exhausts_attempts() {
        let dir = temp_dir();
        seed(&dir);
        let store = Arc::new(FlakyStore::new(&dir, "vix_hourly", usize::MAX));

        let err = flaky_context(&store).load(&Instrument::new("AAPL")).unwrap_err();
        assert!(matches!(
            err,
            ContextError::Transient { attempts: 3, ref dataset, .. } if dataset == "vix_hourly"
        ));
        assert!(err.is_transient());
        assert_eq!(store.reads.load(Ordering::SeqCst), 3);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_dataset_is_read_once() {
        let dir = temp_dir();
        let store = Arc::new(FlakyStore::new(&dir, "spx_holdings_hourly", 0));

        let err = flaky_context(&store).load(&Instrument::new("AAPL")).unwrap_err();
        assert!(matches!(err, ContextError::DatasetNotFound { .. }));
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn quality_failure_is_read_once() {
        let dir = temp_dir();
        let seeded = seed(&dir);
        write(
            &seeded,
            "spx_holdings_hourly",
            vec![0, HOUR, HOUR],
            vec![("AAPL", vec![Some(1.0), Some(2.0), Some(3.0)])],
        );
        let store = Arc::new(FlakyStore::new(&dir, "spx_holdings_hourly", 0));

        let err = flaky_context(&store).load(&Instrument::new("AAPL")).unwrap_err();
        assert!(matches!(err, ContextError::DataQuality(_)));
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}

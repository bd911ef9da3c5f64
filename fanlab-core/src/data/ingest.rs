//! Market-data ingestion: fetch symbol closes plus the volatility and market
//! indices, write the three input datasets.

use super::context::DatasetLayout;
use super::frame::{self, FrameError};
use super::provider::{ClosePoint, Interval, MarketDataProvider, ProviderError};
use super::store::{DatasetStore, StoreError};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

pub const VOLATILITY_SYMBOL: &str = "^VIX";
pub const MARKET_SYMBOL: &str = "^GSPC";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no data fetched for any of {0} symbol(s)")]
    NoData(usize),

    #[error("failed to fetch {series} ({symbol}): {source}")]
    MarketSeries {
        series: &'static str,
        symbol: &'static str,
        #[source]
        source: ProviderError,
    },

    #[error("building frame: {0}")]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: Interval,
}

#[derive(Debug)]
pub struct IngestSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub holdings_records: usize,
    pub volatility_records: usize,
    pub market_records: usize,
    pub locations: Vec<String>,
}

/// Fetch everything and write the holdings, volatility and market datasets.
///
/// A symbol that fails is recorded and skipped. Failure to fetch either index
/// aborts the ingest.
pub fn ingest_market_data(
    provider: &dyn MarketDataProvider,
    store: &dyn DatasetStore,
    layout: &DatasetLayout,
    request: &IngestRequest,
) -> Result<IngestSummary, IngestError> {
    info!(
        provider = provider.name(),
        symbols = request.symbols.len(),
        start = %request.start,
        end = %request.end,
        interval = request.interval.as_str(),
        "ingesting market data"
    );

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    let mut series = Vec::new();
    for symbol in &request.symbols {
        match provider.fetch_closes(symbol, request.start, request.end, request.interval) {
            Ok(points) => {
                succeeded.push(symbol.clone());
                series.push((symbol.as_str(), points));
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "fetch failed, skipping symbol");
                failed.push((symbol.clone(), e.to_string()));
            }
        }
    }
    if series.is_empty() {
        return Err(IngestError::NoData(request.symbols.len()));
    }

    let fetch_index = |series: &'static str, symbol: &'static str| {
        provider
            .fetch_closes(symbol, request.start, request.end, request.interval)
            .map_err(|source| IngestError::MarketSeries {
                series,
                symbol,
                source,
            })
    };
    let volatility = fetch_index("volatility", VOLATILITY_SYMBOL)?;
    let market = fetch_index("market", MARKET_SYMBOL)?;

    let mut holdings = holdings_frame(&layout.timestamp_column, &series)?;
    let mut vol_df = single_series_frame(&layout.timestamp_column, &layout.volatility_column, &volatility)?;
    let mut market_df = single_series_frame(&layout.timestamp_column, &layout.market_column, &market)?;

    let locations = vec![
        store.write(&layout.holdings, &mut holdings)?,
        store.write(&layout.volatility, &mut vol_df)?,
        store.write(&layout.market, &mut market_df)?,
    ];

    info!(
        succeeded = succeeded.len(),
        failed = failed.len(),
        records = holdings.height(),
        "ingest complete"
    );

    Ok(IngestSummary {
        succeeded,
        failed,
        holdings_records: holdings.height(),
        volatility_records: vol_df.height(),
        market_records: market_df.height(),
        locations,
    })
}

/// Outer join of symbol closes on timestamp; gaps become nulls.
fn holdings_frame(timestamp_column: &str, series: &[(&str, Vec<ClosePoint>)]) -> Result<DataFrame, FrameError> {
    let mut rows: BTreeMap<i64, Vec<Option<f64>>> = BTreeMap::new();
    for (i, (_, points)) in series.iter().enumerate() {
        for p in points {
            let row = rows
                .entry(p.timestamp_ms)
                .or_insert_with(|| vec![None; series.len()]);
            row[i].get_or_insert(p.close);
        }
    }

    let timestamps: Vec<i64> = rows.keys().copied().collect();
    let mut columns = vec![frame::timestamp_column(timestamp_column, timestamps)?];
    for (i, (symbol, _)) in series.iter().enumerate() {
        let values: Vec<Option<f64>> = rows.values().map(|row| row[i]).collect();
        columns.push(Column::new((*symbol).into(), values));
    }
    Ok(DataFrame::new(columns)?)
}

/// First close per timestamp wins, ascending.
fn single_series_frame(timestamp_column: &str, value_column: &str, points: &[ClosePoint]) -> Result<DataFrame, FrameError> {
    let mut by_time = BTreeMap::new();
    for p in points {
        by_time.entry(p.timestamp_ms).or_insert(p.close);
    }
    Ok(DataFrame::new(vec![
        frame::timestamp_column(timestamp_column, by_time.keys().copied().collect())?,
        Column::new(value_column.into(), by_time.values().copied().collect::<Vec<f64>>()),
    ])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::ParquetStore;
    use std::collections::HashMap;
    use std::env;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("fanlab_ingest_test_{}_{id}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    struct MockProvider {
        data: HashMap<&'static str, Vec<(i64, f64)>>,
    }

    impl MarketDataProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        fn fetch_closes(
            &self,
            symbol: &str,
            _start: NaiveDate,
            _end: NaiveDate,
            _interval: Interval,
        ) -> Result<Vec<ClosePoint>, ProviderError> {
            self.data
                .get(symbol)
                .map(|v| {
                    v.iter()
                        .map(|&(timestamp_ms, close)| ClosePoint { timestamp_ms, close })
                        .collect()
                })
                .ok_or_else(|| ProviderError::SymbolNotFound {
                    symbol: symbol.to_string(),
                })
        }
    }

    fn request(symbols: &[&str]) -> IngestRequest {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        IngestRequest {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            start: d,
            end: d,
            interval: Interval::Hourly,
        }
    }

    fn provider() -> MockProvider {
        MockProvider {
            data: HashMap::from([
                ("AAPL", vec![(0, 1.0), (1000, 2.0)]),
                ("MSFT", vec![(1000, 3.0), (2000, 4.0)]),
                ("^VIX", vec![(0, 15.0), (1000, 16.0), (2000, 17.0)]),
                ("^GSPC", vec![(0, 4000.0), (1000, 4001.0), (2000, 4002.0)]),
            ]),
        }
    }

    #[test]
    fn outer_joins_symbols_and_skips_failures() {
        let dir = temp_dir();
        let store = ParquetStore::new(&dir);
        let layout = DatasetLayout::default();

        let summary =
            ingest_market_data(&provider(), &store, &layout, &request(&["AAPL", "NOPE", "MSFT"])).unwrap();
        assert_eq!(summary.succeeded, vec!["AAPL", "MSFT"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.holdings_records, 3);

        let holdings = store.read("spx_holdings_hourly").unwrap();
        assert_eq!(
            frame::f64_values(&holdings, "AAPL").unwrap(),
            vec![Some(1.0), Some(2.0), None]
        );
        assert_eq!(
            frame::f64_values(&holdings, "MSFT").unwrap(),
            vec![None, Some(3.0), Some(4.0)]
        );
        let vix = store.read("vix_hourly").unwrap();
        assert_eq!(frame::f64_values(&vix, "VIX").unwrap().len(), 3);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn no_symbols_fetched_is_an_error() {
        let store = ParquetStore::new(temp_dir());
        let err = ingest_market_data(&provider(), &store, &DatasetLayout::default(), &request(&["NOPE"]))
            .unwrap_err();
        assert!(matches!(err, IngestError::NoData(1)));
    }

    #[test]
    fn missing_index_aborts() {
        let mut p = provider();
        p.data.remove("^VIX");
        let store = ParquetStore::new(temp_dir());
        let err = ingest_market_data(&p, &store, &DatasetLayout::default(), &request(&["AAPL"])).unwrap_err();
        assert!(matches!(err, IngestError::MarketSeries { series: "volatility", .. }));
    }
}

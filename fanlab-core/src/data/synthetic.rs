//! Deterministic synthetic market data.
//!
//! Produces the three input datasets (holdings, volatility, market index) at
//! eight intraday timestamps per weekday, US Eastern session times. Same
//! config, same bytes.

use super::context::DatasetLayout;
use super::frame::{self, FrameError};
use super::store::{DatasetStore, StoreError};
use crate::domain::Instrument;
use chrono::{Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Weekday};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Session timestamps (Eastern, fixed UTC-5).
const SESSION: [(u32, u32); 8] = [
    (9, 30),
    (10, 30),
    (11, 30),
    (12, 30),
    (13, 30),
    (14, 30),
    (15, 30),
    (16, 0),
];

const TICKERS: [&str; 10] = [
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK-B", "V", "UNH",
];

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub instruments: usize,
    pub trading_days: usize,
    pub start: NaiveDate,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            instruments: 10,
            trading_days: 20,
            start: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap_or_default(),
            seed: 42,
        }
    }
}

/// Generated datasets, ready to write.
pub struct SyntheticMarket {
    pub instruments: Vec<Instrument>,
    pub holdings: DataFrame,
    pub volatility: DataFrame,
    pub market: DataFrame,
}

impl SyntheticMarket {
    pub fn timestamp_count(&self) -> usize {
        self.market.height()
    }

    /// Write all three datasets under the layout's names.
    pub fn write(&mut self, store: &dyn DatasetStore, layout: &DatasetLayout) -> Result<Vec<String>, StoreError> {
        Ok(vec![
            store.write(&layout.holdings, &mut self.holdings)?,
            store.write(&layout.volatility, &mut self.volatility)?,
            store.write(&layout.market, &mut self.market)?,
        ])
    }
}

/// Instrument names: well-known tickers first, then `SYN011`, `SYN012`, ...
pub fn instrument_names(n: usize) -> Vec<Instrument> {
    (0..n)
        .map(|i| match TICKERS.get(i) {
            Some(t) => Instrument::new(*t),
            None => Instrument::new(format!("SYN{:03}", i + 1)),
        })
        .collect()
}

/// Session timestamps in epoch milliseconds for `days` weekdays from `start`.
pub fn session_timestamps(start: NaiveDate, days: usize) -> Vec<i64> {
    let eastern = FixedOffset::west_opt(5 * 3600);
    let mut out = Vec::with_capacity(days * SESSION.len());
    let mut date = start;
    let mut produced = 0;
    while produced < days {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            for (h, m) in SESSION {
                let local = NaiveTime::from_hms_opt(h, m, 0).map(|t| date.and_time(t));
                let utc = local.zip(eastern).and_then(|(l, tz)| tz.from_local_datetime(&l).single());
                if let Some(ts) = utc {
                    out.push(ts.timestamp_millis());
                }
            }
            produced += 1;
        }
        date += Duration::days(1);
    }
    out
}

pub fn generate(config: &SyntheticConfig, layout: &DatasetLayout) -> Result<SyntheticMarket, FrameError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let timestamps = session_timestamps(config.start, config.trading_days);
    let n = timestamps.len();
    let instruments = instrument_names(config.instruments);

    let mut market = Vec::with_capacity(n);
    let mut volatility = Vec::with_capacity(n);
    let mut market_returns = Vec::with_capacity(n);
    let mut spx = 4700.0_f64;
    let mut vix = 15.0_f64;
    for i in 0..n {
        let r = if i == 0 { 0.0 } else { rng.gen_range(-0.004..0.004) };
        spx *= 1.0 + r;
        vix = (vix + 0.1 * (18.0 - vix) + rng.gen_range(-0.8..0.8)).clamp(9.0, 80.0);
        market.push(spx);
        volatility.push(vix);
        market_returns.push(r);
    }

    let mut columns = vec![frame::timestamp_column(&layout.timestamp_column, timestamps.clone())?];
    for instrument in &instruments {
        let beta: f64 = rng.gen_range(0.5..1.8);
        let mut price: f64 = rng.gen_range(20.0..500.0);
        let mut series = Vec::with_capacity(n);
        for r_m in &market_returns {
            let r = beta * r_m + rng.gen_range(-0.006..0.006);
            price = (price * (1.0 + r)).max(0.01);
            series.push(price);
        }
        columns.push(Column::new(instrument.as_str().into(), series));
    }
    columns.push(Column::new(layout.market_column.as_str().into(), market.clone()));
    let holdings = DataFrame::new(columns)?;

    let volatility = DataFrame::new(vec![
        frame::timestamp_column(&layout.timestamp_column, timestamps.clone())?,
        Column::new(layout.volatility_column.as_str().into(), volatility),
    ])?;
    let market = DataFrame::new(vec![
        frame::timestamp_column(&layout.timestamp_column, timestamps)?,
        Column::new(layout.market_column.as_str().into(), market),
    ])?;

    Ok(SyntheticMarket {
        instruments,
        holdings,
        volatility,
        market,
    })
}

//! Persisted partition results.
//!
//! One columnar file per instrument. Columns are every `SignalRecord` field
//! plus the partition counters replicated on each row, so a downstream
//! reader can load any single file without a side table.

use fanlab_core::data::frame::{self, FrameError};
use fanlab_core::domain::{
    millis_to_timestamp, Instrument, ParseLabelError, Signal, SignalRecord, TradeQuality,
};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::{mean_f64, mean_present, win_rate};

pub mod columns {
    pub const INSTRUMENT: &str = "instrument";
    pub const TIMESTAMP: &str = "timestamp";
    pub const PRICE: &str = "price";
    pub const VOLATILITY_INDEX: &str = "volatility_index";
    pub const MARKET_INDEX: &str = "market_index";
    pub const PRICE_CHANGE_PCT: &str = "price_change_pct";
    pub const MARKET_CHANGE_PCT: &str = "market_change_pct";
    pub const BETA: &str = "beta";
    pub const BUY_THRESHOLD: &str = "buy_threshold";
    pub const SELL_THRESHOLD: &str = "sell_threshold";
    pub const SIGNAL: &str = "signal";
    pub const TRADE_QUALITY: &str = "trade_quality";
    pub const TOTAL_TRADES: &str = "total_trades";
    pub const GOOD_TRADES: &str = "good_trades";
    pub const BAD_TRADES: &str = "bad_trades";
    pub const WIN_RATE: &str = "win_rate";
    pub const AVG_BETA: &str = "avg_beta";
    pub const AVG_VOLATILITY: &str = "avg_volatility";
}

#[derive(Debug, Error)]
pub enum ResultDecodeError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("partition file has no rows")]
    Empty,

    #[error("partition file mixes instruments '{0}' and '{1}'")]
    MixedInstruments(String, String),

    #[error("null or out-of-range '{column}' at row {row}")]
    MissingValue { column: &'static str, row: usize },

    #[error(transparent)]
    Label(#[from] ParseLabelError),
}

/// Summary counters of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PartitionCounters {
    /// Non-hold signals.
    pub total_trades: usize,
    pub good_trades: usize,
    pub bad_trades: usize,
    /// `good / (good + bad) * 100`.
    pub win_rate: f64,
    pub avg_beta: f64,
    /// Mean of the present volatility values.
    pub avg_volatility: f64,
}

impl PartitionCounters {
    pub fn from_records(records: &[SignalRecord]) -> Self {
        let total_trades = records.iter().filter(|r| r.signal.is_trade()).count();
        let good_trades = records
            .iter()
            .filter(|r| r.trade_quality == TradeQuality::Good)
            .count();
        let bad_trades = records
            .iter()
            .filter(|r| r.trade_quality == TradeQuality::Bad)
            .count();
        let betas: Vec<f64> = records.iter().map(|r| r.beta).collect();

        Self {
            total_trades,
            good_trades,
            bad_trades,
            win_rate: win_rate(good_trades, bad_trades),
            avg_beta: mean_f64(&betas),
            avg_volatility: mean_present(records.iter().map(|r| r.volatility_index)),
        }
    }
}

/// The full record sequence of one instrument plus its counters.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionResult {
    pub instrument: Instrument,
    pub records: Vec<SignalRecord>,
    pub counters: PartitionCounters,
}

impl PartitionResult {
    pub fn new(instrument: Instrument, records: Vec<SignalRecord>) -> Self {
        let counters = PartitionCounters::from_records(&records);
        Self {
            instrument,
            records,
            counters,
        }
    }

    pub fn to_frame(&self) -> Result<DataFrame, FrameError> {
        use columns::*;

        let n = self.records.len();
        let rs = &self.records;
        let c = &self.counters;
        let opt = |f: fn(&SignalRecord) -> Option<f64>| rs.iter().map(f).collect::<Vec<_>>();
        let val = |f: fn(&SignalRecord) -> f64| rs.iter().map(f).collect::<Vec<_>>();

        Ok(DataFrame::new(vec![
            Column::new(INSTRUMENT.into(), vec![self.instrument.as_str(); n]),
            frame::timestamp_column(
                TIMESTAMP,
                rs.iter().map(|r| r.timestamp.timestamp_millis()).collect(),
            )?,
            Column::new(PRICE.into(), val(|r| r.price)),
            Column::new(VOLATILITY_INDEX.into(), opt(|r| r.volatility_index)),
            Column::new(MARKET_INDEX.into(), opt(|r| r.market_index)),
            Column::new(PRICE_CHANGE_PCT.into(), val(|r| r.price_change_pct)),
            Column::new(MARKET_CHANGE_PCT.into(), opt(|r| r.market_change_pct)),
            Column::new(BETA.into(), val(|r| r.beta)),
            Column::new(BUY_THRESHOLD.into(), opt(|r| r.buy_threshold)),
            Column::new(SELL_THRESHOLD.into(), opt(|r| r.sell_threshold)),
            Column::new(SIGNAL.into(), rs.iter().map(|r| r.signal.as_str()).collect::<Vec<_>>()),
            Column::new(
                TRADE_QUALITY.into(),
                rs.iter().map(|r| r.trade_quality.as_str()).collect::<Vec<_>>(),
            ),
            Column::new(TOTAL_TRADES.into(), vec![c.total_trades as u64; n]),
            Column::new(GOOD_TRADES.into(), vec![c.good_trades as u64; n]),
            Column::new(BAD_TRADES.into(), vec![c.bad_trades as u64; n]),
            Column::new(WIN_RATE.into(), vec![c.win_rate; n]),
            Column::new(AVG_BETA.into(), vec![c.avg_beta; n]),
            Column::new(AVG_VOLATILITY.into(), vec![c.avg_volatility; n]),
        ])?)
    }

    /// Decode a persisted partition. Counters are recomputed from the
    /// records rather than trusted from the replicated columns.
    pub fn from_frame(df: &DataFrame) -> Result<Self, ResultDecodeError> {
        use columns::*;

        let instruments = frame::str_values(df, INSTRUMENT)?;
        let timestamps = frame::timestamp_millis(df, TIMESTAMP)?;
        let price = frame::f64_values(df, PRICE)?;
        let volatility = frame::f64_values(df, VOLATILITY_INDEX)?;
        let market = frame::f64_values(df, MARKET_INDEX)?;
        let change = frame::f64_values(df, PRICE_CHANGE_PCT)?;
        let market_change = frame::f64_values(df, MARKET_CHANGE_PCT)?;
        let beta = frame::f64_values(df, BETA)?;
        let buy = frame::f64_values(df, BUY_THRESHOLD)?;
        let sell = frame::f64_values(df, SELL_THRESHOLD)?;
        let signals = frame::str_values(df, SIGNAL)?;
        let qualities = frame::str_values(df, TRADE_QUALITY)?;

        let mut instrument: Option<String> = None;
        let mut records = Vec::with_capacity(df.height());
        for row in 0..df.height() {
            let required = |v: Option<f64>, column: &'static str| {
                v.ok_or(ResultDecodeError::MissingValue { column, row })
            };

            let name = instruments[row]
                .clone()
                .ok_or(ResultDecodeError::MissingValue {
                    column: INSTRUMENT,
                    row,
                })?;
            match &instrument {
                None => instrument = Some(name),
                Some(first) if *first != name => {
                    return Err(ResultDecodeError::MixedInstruments(first.clone(), name))
                }
                Some(_) => {}
            }

            let timestamp = timestamps[row]
                .and_then(millis_to_timestamp)
                .ok_or(ResultDecodeError::MissingValue {
                    column: TIMESTAMP,
                    row,
                })?;
            let signal: Signal = signals[row]
                .as_deref()
                .ok_or(ResultDecodeError::MissingValue { column: SIGNAL, row })?
                .parse()?;
            let trade_quality: TradeQuality = qualities[row]
                .as_deref()
                .ok_or(ResultDecodeError::MissingValue {
                    column: TRADE_QUALITY,
                    row,
                })?
                .parse()?;

            records.push(SignalRecord {
                timestamp,
                price: required(price[row], PRICE)?,
                volatility_index: volatility[row],
                market_index: market[row],
                price_change_pct: required(change[row], PRICE_CHANGE_PCT)?,
                market_change_pct: market_change[row],
                beta: required(beta[row], BETA)?,
                buy_threshold: buy[row],
                sell_threshold: sell[row],
                signal,
                trade_quality,
            });
        }

        let instrument = instrument.ok_or(ResultDecodeError::Empty)?;
        Ok(Self::new(Instrument::new(instrument), records))
    }
}

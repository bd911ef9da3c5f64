//! Aggregator: fan-in over every persisted partition.
//!
//! Reads whatever partition outputs exist when it runs, merges them per
//! instrument in time order and reconciles trade-quality labels with full
//! visibility of the merged series. A partition labels its last record
//! unevaluable and may have been computed from stale context, so the
//! portfolio pass is allowed to disagree with it at partition boundaries.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use fanlab_core::data::{DatasetStore, ParquetStore, StoreError};
use fanlab_core::domain::{Instrument, SignalRecord, Timestamp, TradeQuality};
use fanlab_core::signal::quality::{label, next_changes, trade_pnl};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::QualityReconciliation;
use crate::metrics::{mean_f64, mean_present, sharpe_ratio, win_rate};
use crate::publish::{publish_or_warn, NullPublisher, SummaryPublisher};
use crate::reports;
use crate::result::PartitionResult;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no loadable partition results found in {location}")]
    NoResultsFound { location: String },

    #[error("listing partition results: {0}")]
    Store(#[from] StoreError),
}

/// A partition output that exists but could not be loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedPartition {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentRollup {
    pub instrument: Instrument,
    pub records: usize,
    pub trades: usize,
    pub good: usize,
    pub bad: usize,
    pub win_rate: f64,
    pub avg_beta: f64,
    /// Mean `price_change_pct`.
    pub avg_return: f64,
    pub total_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimestampRollup {
    pub timestamp: Timestamp,
    pub records: usize,
    pub trades: usize,
    pub good: usize,
    pub bad: usize,
    pub win_rate: f64,
    pub avg_volatility: f64,
    pub avg_return: f64,
}

/// Portfolio-level statistics. Built fresh on every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioMetrics {
    pub quality_mode: QualityReconciliation,
    pub partitions_loaded: usize,
    pub total_instruments: usize,
    pub total_timestamps: usize,
    pub total_records: usize,
    /// Non-hold signals.
    pub total_trades: usize,
    pub good_trades: usize,
    pub bad_trades: usize,
    pub neutral_trades: usize,
    pub unevaluable_records: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl: f64,
    pub sharpe_ratio: f64,
    pub avg_beta: f64,
    pub avg_volatility: f64,
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    /// Records whose reconciled label differs from the persisted one.
    pub label_disagreements: usize,
    pub failed_partitions: Vec<FailedPartition>,
    pub missing_instruments: Vec<Instrument>,
    pub instruments: Vec<InstrumentRollup>,
    pub timestamps: Vec<TimestampRollup>,
}

impl PortfolioMetrics {
    pub fn evaluable_records(&self) -> usize {
        self.total_records - self.unevaluable_records
    }
}

/// Relabel a time-ordered single-instrument sequence. Returns how many
/// labels changed.
pub fn reconcile(records: &mut [SignalRecord], mode: QualityReconciliation) -> usize {
    let next = next_changes(records);
    let mut changed = 0;
    for (record, next) in records.iter_mut().zip(next) {
        let persisted = record.trade_quality;
        let reconciled = match mode {
            QualityReconciliation::ReusePartition if persisted.is_evaluable() => persisted,
            _ => label(record.signal, next),
        };
        if reconciled != persisted {
            changed += 1;
            record.trade_quality = reconciled;
        }
    }
    changed
}

#[derive(Default)]
struct TimestampTally {
    records: usize,
    trades: usize,
    good: usize,
    bad: usize,
    returns: Vec<f64>,
    volatility: Vec<Option<f64>>,
}

pub struct Aggregator {
    quality: QualityReconciliation,
    publisher: Arc<dyn SummaryPublisher>,
}

impl Aggregator {
    pub fn new(quality: QualityReconciliation) -> Self {
        Self {
            quality,
            publisher: Arc::new(NullPublisher),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn SummaryPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Aggregate the `*.parquet` partition outputs under `result_location`.
    pub fn run(
        &self,
        result_location: &Path,
        filter: Option<&[Instrument]>,
    ) -> Result<PortfolioMetrics, AggregateError> {
        let store = ParquetStore::new(result_location);
        self.run_on(&store, &result_location.display().to_string(), filter)
    }

    pub fn run_on(
        &self,
        store: &dyn DatasetStore,
        location: &str,
        filter: Option<&[Instrument]>,
    ) -> Result<PortfolioMetrics, AggregateError> {
        let available = store.list()?;

        let (names, missing_instruments) = match filter {
            Some(wanted) => {
                let present: BTreeSet<&str> = available.iter().map(String::as_str).collect();
                let names = available
                    .iter()
                    .filter(|n| wanted.iter().any(|w| w.as_str() == n.as_str()))
                    .cloned()
                    .collect::<Vec<_>>();
                let missing = wanted
                    .iter()
                    .filter(|w| !present.contains(w.as_str()))
                    .cloned()
                    .collect::<Vec<_>>();
                (names, missing)
            }
            None => (available, Vec::new()),
        };
        for m in &missing_instruments {
            warn!(instrument = %m, "no partition output for requested instrument");
        }

        let mut merged: BTreeMap<Instrument, Vec<SignalRecord>> = BTreeMap::new();
        let mut failed_partitions = Vec::new();
        let mut partitions_loaded = 0;
        for name in &names {
            let decoded = store
                .read(name)
                .map_err(|e| e.to_string())
                .and_then(|df| PartitionResult::from_frame(&df).map_err(|e| e.to_string()));
            match decoded {
                Ok(result) => {
                    partitions_loaded += 1;
                    merged
                        .entry(result.instrument)
                        .or_default()
                        .extend(result.records);
                }
                Err(reason) => {
                    warn!(partition = %name, %reason, "skipping unreadable partition output");
                    failed_partitions.push(FailedPartition {
                        name: name.clone(),
                        reason,
                    });
                }
            }
        }

        if partitions_loaded == 0 {
            return Err(AggregateError::NoResultsFound {
                location: location.to_string(),
            });
        }

        let mut metrics = self.compute(merged);
        metrics.partitions_loaded = partitions_loaded;
        metrics.failed_partitions = failed_partitions;
        metrics.missing_instruments = missing_instruments;

        info!(
            partitions = metrics.partitions_loaded,
            failed = metrics.failed_partitions.len(),
            records = metrics.total_records,
            trades = metrics.total_trades,
            win_rate = metrics.win_rate,
            sharpe = metrics.sharpe_ratio,
            disagreements = metrics.label_disagreements,
            "portfolio aggregated"
        );
        publish_or_warn(
            self.publisher.as_ref(),
            "portfolio-summary",
            &reports::portfolio_summary(&metrics),
        );
        Ok(metrics)
    }

    fn compute(&self, merged: BTreeMap<Instrument, Vec<SignalRecord>>) -> PortfolioMetrics {
        let mut label_disagreements = 0;
        let mut instruments = Vec::with_capacity(merged.len());
        let mut by_timestamp: BTreeMap<Timestamp, TimestampTally> = BTreeMap::new();

        let mut all_pnl = Vec::new();
        let mut betas = Vec::new();
        let mut volatility = Vec::new();
        let (mut good, mut bad, mut neutral, mut unevaluable, mut trades) = (0, 0, 0, 0, 0);

        let total_instruments = merged.len();
        for (instrument, mut records) in merged {
            records.sort_by_key(|r| r.timestamp);
            let before = records.len();
            records.dedup_by_key(|r| r.timestamp);
            if records.len() < before {
                debug!(%instrument, dropped = before - records.len(), "duplicate timestamps across partitions");
            }
            label_disagreements += reconcile(&mut records, self.quality);

            let next = next_changes(&records);
            let mut pnl = Vec::new();
            let (mut i_good, mut i_bad, mut i_trades) = (0, 0, 0);
            for (r, next) in records.iter().zip(next) {
                let tally = by_timestamp.entry(r.timestamp).or_default();
                tally.records += 1;
                tally.returns.push(r.price_change_pct);
                tally.volatility.push(r.volatility_index);

                if r.signal.is_trade() {
                    i_trades += 1;
                    tally.trades += 1;
                    if let Some(p) = trade_pnl(r.signal, next) {
                        pnl.push(p);
                    }
                }
                match r.trade_quality {
                    TradeQuality::Good => {
                        i_good += 1;
                        tally.good += 1;
                    }
                    TradeQuality::Bad => {
                        i_bad += 1;
                        tally.bad += 1;
                    }
                    TradeQuality::Neutral => neutral += 1,
                    TradeQuality::Unevaluable => unevaluable += 1,
                }
                betas.push(r.beta);
                volatility.push(r.volatility_index);
            }

            let i_betas: Vec<f64> = records.iter().map(|r| r.beta).collect();
            let returns: Vec<f64> = records.iter().map(|r| r.price_change_pct).collect();
            instruments.push(InstrumentRollup {
                instrument,
                records: records.len(),
                trades: i_trades,
                good: i_good,
                bad: i_bad,
                win_rate: win_rate(i_good, i_bad),
                avg_beta: mean_f64(&i_betas),
                avg_return: mean_f64(&returns),
                total_pnl: pnl.iter().sum(),
            });
            good += i_good;
            bad += i_bad;
            trades += i_trades;
            all_pnl.extend(pnl);
        }

        instruments.sort_by(|a, b| {
            b.win_rate
                .total_cmp(&a.win_rate)
                .then_with(|| a.instrument.cmp(&b.instrument))
        });

        let start = by_timestamp.keys().next().copied();
        let end = by_timestamp.keys().next_back().copied();
        let timestamps: Vec<TimestampRollup> = by_timestamp
            .into_iter()
            .map(|(timestamp, t)| TimestampRollup {
                timestamp,
                records: t.records,
                trades: t.trades,
                good: t.good,
                bad: t.bad,
                win_rate: win_rate(t.good, t.bad),
                avg_volatility: mean_present(t.volatility),
                avg_return: mean_f64(&t.returns),
            })
            .collect();

        PortfolioMetrics {
            quality_mode: self.quality,
            partitions_loaded: 0,
            total_instruments,
            total_timestamps: timestamps.len(),
            total_records: betas.len(),
            total_trades: trades,
            good_trades: good,
            bad_trades: bad,
            neutral_trades: neutral,
            unevaluable_records: unevaluable,
            win_rate: win_rate(good, bad),
            total_pnl: all_pnl.iter().sum(),
            avg_pnl: mean_f64(&all_pnl),
            sharpe_ratio: sharpe_ratio(&all_pnl),
            avg_beta: mean_f64(&betas),
            avg_volatility: mean_present(volatility),
            start,
            end,
            label_disagreements,
            failed_partitions: Vec::new(),
            missing_instruments: Vec::new(),
            instruments,
            timestamps,
        }
    }
}

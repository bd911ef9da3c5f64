//! Partition worker: one instrument end to end.
//!
//! load context → compute signals → persist → summarize. The unit the
//! execution engine runs in parallel. Workers share nothing mutable; each
//! writes only its own instrument's output.

use std::sync::Arc;

use fanlab_core::data::{ContextError, DatasetStore, FrameError, MarketContextStore, StoreError};
use fanlab_core::domain::Instrument;
use fanlab_core::fingerprint::records_hash;
use fanlab_core::signal::SignalEngine;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::publish::{publish_or_warn, NullPublisher, SummaryPublisher};
use crate::reports;
use crate::result::{PartitionCounters, PartitionResult};

/// Why a partition failed.
#[derive(Debug, Error)]
pub enum FailureCause {
    #[error("injected fault at symbol index {0}")]
    InjectedFault(usize),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("only {0} observation(s), at least 2 are needed")]
    InsufficientData(usize),

    #[error("encoding result: {0}")]
    Encode(#[from] FrameError),

    #[error("writing result: {0}")]
    Store(#[from] StoreError),

    #[error("worker panicked: {0}")]
    Panicked(String),

    #[error("worker exited without reporting an outcome")]
    Lost,
}

impl FailureCause {
    /// Short stable name for summaries and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FailureCause::InjectedFault(_) => "injected_fault",
            FailureCause::Context(ContextError::DataQuality(_)) => "data_quality",
            FailureCause::Context(e) if e.is_transient() => "transient_data",
            FailureCause::Context(_) => "context",
            FailureCause::InsufficientData(_) => "insufficient_data",
            FailureCause::Encode(_) => "encode",
            FailureCause::Store(_) => "store",
            FailureCause::Panicked(_) => "panicked",
            FailureCause::Lost => "lost",
        }
    }
}

/// A single partition's fatal error. Isolated to that partition.
#[derive(Debug, Error)]
#[error("partition {instrument} (index {symbol_index}) failed: {cause}")]
pub struct PartitionFailure {
    pub instrument: Instrument,
    pub symbol_index: usize,
    pub cause: FailureCause,
}

impl PartitionFailure {
    pub fn new(instrument: Instrument, symbol_index: usize, cause: FailureCause) -> Self {
        Self {
            instrument,
            symbol_index,
            cause,
        }
    }

    pub fn is_injected(&self) -> bool {
        matches!(self.cause, FailureCause::InjectedFault(_))
    }
}

/// What a successful partition reports back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionSummary {
    pub instrument: Instrument,
    pub symbol_index: usize,
    pub output_path: String,
    pub records: usize,
    pub counters: PartitionCounters,
    pub records_hash: String,
}

impl PartitionSummary {
    pub fn total_trades(&self) -> usize {
        self.counters.total_trades
    }

    /// Win rate in percent.
    pub fn success_rate(&self) -> f64 {
        self.counters.win_rate
    }

    pub fn avg_beta(&self) -> f64 {
        self.counters.avg_beta
    }
}

pub struct PartitionWorker {
    context: MarketContextStore,
    engine: SignalEngine,
    results: Arc<dyn DatasetStore>,
    publisher: Arc<dyn SummaryPublisher>,
    fault_sentinel: Option<usize>,
}

impl PartitionWorker {
    pub fn new(context: MarketContextStore, engine: SignalEngine, results: Arc<dyn DatasetStore>) -> Self {
        Self {
            context,
            engine,
            results,
            publisher: Arc::new(NullPublisher),
            fault_sentinel: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn SummaryPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Symbol index that fails deterministically before any work. `None` disables.
    pub fn with_fault_sentinel(mut self, sentinel: Option<usize>) -> Self {
        self.fault_sentinel = sentinel;
        self
    }

    pub fn results(&self) -> &Arc<dyn DatasetStore> {
        &self.results
    }

    /// Analyze one instrument. Re-running on unchanged inputs rewrites an
    /// identical output.
    pub fn run(&self, instrument: &Instrument, symbol_index: usize) -> Result<PartitionSummary, PartitionFailure> {
        let span = info_span!("partition", instrument = %instrument, symbol_index);
        let _enter = span.enter();

        let fail = |cause: FailureCause| PartitionFailure::new(instrument.clone(), symbol_index, cause);

        if self.fault_sentinel == Some(symbol_index) {
            warn!("fault sentinel hit, failing before any work");
            return Err(fail(FailureCause::InjectedFault(symbol_index)));
        }

        let observations = self
            .context
            .load(instrument)
            .map_err(|e| fail(e.into()))?;
        if observations.len() < 2 {
            return Err(fail(FailureCause::InsufficientData(observations.len())));
        }

        let records = self.engine.compute(&observations);
        let hash = records_hash(&records);
        let result = PartitionResult::new(instrument.clone(), records);
        debug!(records = result.records.len(), "signals computed");

        let mut frame = result.to_frame().map_err(|e| fail(e.into()))?;
        let output_path = self
            .results
            .write(instrument.as_str(), &mut frame)
            .map_err(|e| fail(e.into()))?;

        let summary = PartitionSummary {
            instrument: instrument.clone(),
            symbol_index,
            output_path,
            records: result.records.len(),
            counters: result.counters,
            records_hash: hash,
        };

        publish_or_warn(
            self.publisher.as_ref(),
            &format!("{instrument}-analysis-summary"),
            &reports::partition_summary(&summary),
        );

        info!(
            records = summary.records,
            total_trades = summary.counters.total_trades,
            win_rate = summary.counters.win_rate,
            output = %summary.output_path,
            "partition complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::MemoryPublisher;
    use fanlab_core::data::synthetic::{self, SyntheticConfig};
    use fanlab_core::data::{DatasetLayout, ParquetStore, RetryPolicy};

    fn worker(dir: &std::path::Path, publisher: Arc<MemoryPublisher>) -> PartitionWorker {
        let inputs = ParquetStore::new(dir.join("data"));
        let layout = DatasetLayout::default();
        let config = SyntheticConfig {
            instruments: 3,
            trading_days: 2,
            ..SyntheticConfig::default()
        };
        synthetic::generate(&config, &layout)
            .unwrap()
            .write(&inputs, &layout)
            .unwrap();

        let context = MarketContextStore::new(Arc::new(inputs), layout).with_retry(RetryPolicy::none());
        PartitionWorker::new(
            context,
            SignalEngine::default(),
            Arc::new(ParquetStore::new(dir.join("results"))),
        )
        .with_publisher(publisher)
        .with_fault_sentinel(Some(7))
    }

    #[test]
    fn writes_output_and_publishes_summary() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Arc::new(MemoryPublisher::new());
        let w = worker(dir.path(), publisher.clone());

        let summary = w.run(&Instrument::new("MSFT"), 1).unwrap();
        assert_eq!(summary.records, 15);
        assert!(summary.output_path.ends_with("MSFT.parquet"));
        assert!(w.results().exists("MSFT"));
        let md = publisher.get("MSFT-analysis-summary").unwrap();
        assert!(md.contains("MSFT"));
    }

    #[test]
    fn rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let w = worker(dir.path(), Arc::new(MemoryPublisher::new()));
        let a = w.run(&Instrument::new("AAPL"), 0).unwrap();
        let b = w.run(&Instrument::new("AAPL"), 0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sentinel_fails_before_any_output() {
        let dir = tempfile::tempdir().unwrap();
        let w = worker(dir.path(), Arc::new(MemoryPublisher::new()));
        let err = w.run(&Instrument::new("AAPL"), 7).unwrap_err();
        assert!(err.is_injected());
        assert_eq!(err.symbol_index, 7);
        assert_eq!(err.instrument.as_str(), "AAPL");
        assert!(!w.results().exists("AAPL"));
    }

    #[test]
    fn other_indices_ignore_the_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let w = worker(dir.path(), Arc::new(MemoryPublisher::new())).with_fault_sentinel(None);
        assert!(w.run(&Instrument::new("AAPL"), 7).is_ok());
    }

    #[test]
    fn unknown_instrument_is_a_context_failure() {
        let dir = tempfile::tempdir().unwrap();
        let w = worker(dir.path(), Arc::new(MemoryPublisher::new()));
        let err = w.run(&Instrument::new("ZZZZ"), 2).unwrap_err();
        assert_eq!(err.cause.kind(), "context");
    }
}

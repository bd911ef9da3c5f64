//! End-to-end wiring of a configured run.
//!
//! validate → partition → dispatch to the local pool → wait → aggregate.
//! The aggregation step reads whatever the run managed to persist; failed
//! partitions simply have no output. An aggregation failure is part of the
//! outcome, so the run summary survives it.

use std::sync::Arc;

use fanlab_core::data::{DatasetStore, MarketContextStore, ParquetStore, Partitioner, Validator};
use fanlab_core::domain::Instrument;
use fanlab_core::signal::SignalEngine;
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregator::{AggregateError, Aggregator, PortfolioMetrics};
use crate::config::PipelineConfig;
use crate::dispatcher::{DispatchError, Dispatcher, RunSummary};
use crate::executor::{LocalExecutor, SubmitError};
use crate::publish::{publish_or_warn, NullPublisher, SummaryPublisher};
use crate::reports;
use crate::worker::PartitionWorker;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Engine(#[from] SubmitError),
}

#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub timestamp_count: usize,
    /// `None` when aggregation was not requested.
    pub portfolio: Option<Result<PortfolioMetrics, AggregateError>>,
}

pub struct Pipeline {
    config: PipelineConfig,
    inputs: Arc<dyn DatasetStore>,
    results: Arc<dyn DatasetStore>,
    publisher: Arc<dyn SummaryPublisher>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let inputs = Arc::new(ParquetStore::new(&config.data.root));
        let results = Arc::new(ParquetStore::new(config.result_dir()));
        Self {
            config,
            inputs,
            results,
            publisher: Arc::new(NullPublisher),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn SummaryPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn inputs(&self) -> &Arc<dyn DatasetStore> {
        &self.inputs
    }

    pub fn results(&self) -> &Arc<dyn DatasetStore> {
        &self.results
    }

    pub fn context_store(&self) -> MarketContextStore {
        MarketContextStore::new(self.inputs.clone(), self.config.data.layout())
            .with_retry(self.config.retry.policy())
            .with_duplicate_tolerance(self.config.validation.duplicate_tolerance)
    }

    pub fn worker(&self) -> PartitionWorker {
        PartitionWorker::new(
            self.context_store(),
            SignalEngine::new(self.config.signal),
            self.results.clone(),
        )
        .with_publisher(self.publisher.clone())
        .with_fault_sentinel(self.config.dispatch.sentinel())
    }

    pub fn partitioner(&self) -> Partitioner {
        Partitioner::new(
            self.inputs.clone(),
            self.config.data.holdings.clone(),
            self.config.data.timestamp_column.clone(),
            self.config.data.market_column.clone(),
        )
    }

    pub fn validator(&self) -> Validator {
        Validator::new(
            self.inputs.clone(),
            self.config.data.layout(),
            self.config.validation,
        )
    }

    pub fn aggregator(&self) -> Aggregator {
        Aggregator::new(self.config.aggregate.quality).with_publisher(self.publisher.clone())
    }

    /// Run every configured partition and wait for all of them. With
    /// `aggregate`, fold the outputs of this run's instruments into
    /// portfolio metrics.
    pub fn run(&self, aggregate: bool) -> Result<RunOutcome, PipelineError> {
        let executor = LocalExecutor::new(Arc::new(self.worker()), self.config.dispatch.max_concurrency)?;
        let threads = executor.max_concurrency();
        let dispatcher = Dispatcher::new(self.partitioner(), Arc::new(executor))
            .with_validator(self.validator())
            .with_publisher(self.publisher.clone());

        let report = dispatcher.run(self.config.dispatch.num_instruments)?;
        let timestamp_count = report.timestamp_count;
        let dispatched: Vec<Instrument> = report
            .submissions
            .iter()
            .map(|s| s.instrument.clone())
            .collect();

        let summary = report.wait_all();
        publish_or_warn(
            self.publisher.as_ref(),
            "run-summary",
            &reports::run_summary(&summary),
        );

        let portfolio = aggregate.then(|| {
            self.aggregator().run_on(
                self.results.as_ref(),
                &self.config.result_dir().display().to_string(),
                Some(dispatched.as_slice()),
            )
        });
        if let Some(Err(e)) = &portfolio {
            warn!(error = %e, "aggregation failed");
        }

        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len() + summary.not_submitted.len(),
            aggregated = matches!(portfolio, Some(Ok(_))),
            threads,
            "pipeline finished"
        );
        Ok(RunOutcome {
            summary,
            timestamp_count,
            portfolio,
        })
    }
}

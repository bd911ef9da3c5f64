//! fanlab runner: the partitioned fan-out/fan-in pipeline.
//!
//! This crate builds on `fanlab-core` to provide:
//! - Pipeline configuration from TOML
//! - Partition worker and the persisted partition-result codec
//! - Execution-engine seam with a bounded local worker pool
//! - Dispatcher with pre-flight validation and per-instrument submission
//! - Aggregator with label reconciliation and portfolio metrics
//! - Markdown summaries, CSV/JSON export and tracing setup

pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod export;
pub mod metrics;
pub mod pipeline;
pub mod publish;
pub mod reports;
pub mod result;
pub mod telemetry;
pub mod worker;

pub use aggregator::{
    AggregateError, Aggregator, FailedPartition, InstrumentRollup, PortfolioMetrics,
    TimestampRollup,
};
pub use config::{ConfigError, PipelineConfig, QualityReconciliation, RunEnvironment};
pub use dispatcher::{DispatchError, DispatchReport, Dispatcher, RunSummary, Submission};
pub use executor::{
    ExecutionEngine, LocalExecutor, SubmissionHandle, SubmitError, WorkerOutcome, WorkerRequest,
};
pub use pipeline::{Pipeline, PipelineError, RunOutcome};
pub use publish::{MarkdownPublisher, MemoryPublisher, PublishError, SummaryPublisher};
pub use result::{PartitionCounters, PartitionResult, ResultDecodeError};
pub use worker::{FailureCause, PartitionFailure, PartitionSummary, PartitionWorker};

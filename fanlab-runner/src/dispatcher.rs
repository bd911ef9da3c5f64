//! Dispatcher: validate, partition, fan out one submission per instrument.
//!
//! Submission is fire-and-forget. A failed submission is recorded for that
//! instrument and the loop moves on; it never stops the remaining ones.

use std::sync::Arc;

use fanlab_core::data::{PartitionError, Partitioner, ValidationReport, ValidationStatus, Validator};
use fanlab_core::domain::Instrument;
use thiserror::Error;
use tracing::{info, warn};

use crate::executor::{ExecutionEngine, SubmissionHandle, SubmitError, WorkerRequest};
use crate::publish::{publish_or_warn, NullPublisher, SummaryPublisher};
use crate::reports;
use crate::worker::{PartitionFailure, PartitionSummary};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("pre-flight validation failed: {}", .report.critical.join("; "))]
    ValidationFailed { report: Box<ValidationReport> },

    #[error(transparent)]
    Partition(#[from] PartitionError),
}

/// One instrument's submission attempt.
#[derive(Debug)]
pub struct Submission {
    pub instrument: Instrument,
    pub symbol_index: usize,
    pub result: Result<SubmissionHandle, SubmitError>,
}

/// What `Dispatcher::run` returns: every instrument, in order, with its
/// handle or its submission error.
#[derive(Debug)]
pub struct DispatchReport {
    pub submissions: Vec<Submission>,
    pub timestamp_count: usize,
    pub available_instruments: usize,
    pub validation: Option<ValidationReport>,
}

impl DispatchReport {
    pub fn submitted(&self) -> usize {
        self.submissions.iter().filter(|s| s.result.is_ok()).count()
    }

    pub fn submit_failures(&self) -> Vec<(&Instrument, &SubmitError)> {
        self.submissions
            .iter()
            .filter_map(|s| s.result.as_ref().err().map(|e| (&s.instrument, e)))
            .collect()
    }

    /// Block until every submitted partition reports.
    pub fn wait_all(self) -> RunSummary {
        let mut summary = RunSummary::default();
        for submission in self.submissions {
            match submission.result {
                Ok(handle) => match handle.wait() {
                    Ok(s) => summary.succeeded.push(s),
                    Err(f) => {
                        warn!(
                            instrument = %f.instrument,
                            symbol_index = f.symbol_index,
                            cause = f.cause.kind(),
                            error = %f.cause,
                            "partition failed"
                        );
                        summary.failed.push(f);
                    }
                },
                Err(e) => summary.not_submitted.push((submission.instrument, e)),
            }
        }
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            not_submitted = summary.not_submitted.len(),
            "all partitions reported"
        );
        summary
    }
}

/// Final per-partition outcome of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub succeeded: Vec<PartitionSummary>,
    pub failed: Vec<PartitionFailure>,
    pub not_submitted: Vec<(Instrument, SubmitError)>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.not_submitted.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.not_submitted.is_empty()
    }
}

pub struct Dispatcher {
    partitioner: Partitioner,
    engine: Arc<dyn ExecutionEngine>,
    validator: Option<Validator>,
    publisher: Arc<dyn SummaryPublisher>,
}

impl Dispatcher {
    pub fn new(partitioner: Partitioner, engine: Arc<dyn ExecutionEngine>) -> Self {
        Self {
            partitioner,
            engine,
            validator: None,
            publisher: Arc::new(NullPublisher),
        }
    }

    /// Gate dispatch on a pre-flight validation. A FAIL blocks the run.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn SummaryPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Partition and submit. `None` or `Some(0)` dispatches every instrument.
    pub fn run(&self, num_instruments: Option<usize>) -> Result<DispatchReport, DispatchError> {
        let validation = match &self.validator {
            Some(validator) => {
                let report = validator.validate();
                publish_or_warn(
                    self.publisher.as_ref(),
                    "validation-summary",
                    &reports::validation_summary(&report),
                );
                if report.status == ValidationStatus::Fail {
                    return Err(DispatchError::ValidationFailed {
                        report: Box::new(report),
                    });
                }
                Some(report)
            }
            None => None,
        };

        let partition = self.partitioner.partition(num_instruments)?;
        info!(
            instruments = partition.instruments.len(),
            available = partition.available,
            timestamps = partition.timestamp_count,
            "dispatching partitions"
        );

        let submissions: Vec<Submission> = partition
            .instruments
            .into_iter()
            .enumerate()
            .map(|(symbol_index, instrument)| {
                let result = self
                    .engine
                    .submit(WorkerRequest::new(instrument.clone(), symbol_index));
                match &result {
                    Ok(handle) => info!(
                        instrument = %instrument,
                        id = handle.id(),
                        name = handle.name(),
                        "submitted"
                    ),
                    Err(e) => warn!(instrument = %instrument, error = %e, "submission failed"),
                }
                Submission {
                    instrument,
                    symbol_index,
                    result,
                }
            })
            .collect();

        let report = DispatchReport {
            submissions,
            timestamp_count: partition.timestamp_count,
            available_instruments: partition.available,
            validation,
        };

        publish_or_warn(
            self.publisher.as_ref(),
            "orchestrator-summary",
            &reports::orchestrator_summary(&report),
        );
        Ok(report)
    }
}

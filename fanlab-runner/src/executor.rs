//! Execution engine seam and the local bounded worker pool.
//!
//! `submit` never waits for the work itself: it hands the request to the
//! engine and returns a handle. The handle carries the submission's identity
//! (id, name, tags) and a channel on which the outcome eventually arrives.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use fanlab_core::domain::Instrument;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::worker::{FailureCause, PartitionFailure, PartitionSummary, PartitionWorker};

pub type WorkerOutcome = Result<PartitionSummary, PartitionFailure>;

/// One partition worker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRequest {
    pub instrument: Instrument,
    pub symbol_index: usize,
}

impl WorkerRequest {
    pub fn new(instrument: Instrument, symbol_index: usize) -> Self {
        Self {
            instrument,
            symbol_index,
        }
    }

    /// Display name of the submission, `analyze-<instrument>`.
    pub fn name(&self) -> String {
        format!("analyze-{}", self.instrument)
    }
}

#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    #[error("execution engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("submission rejected: {0}")]
    Rejected(String),
}

/// Accepts independent units of work without blocking on them.
pub trait ExecutionEngine: Send + Sync {
    fn submit(&self, request: WorkerRequest) -> Result<SubmissionHandle, SubmitError>;
}

/// Receipt for one submission.
#[derive(Debug)]
pub struct SubmissionHandle {
    id: String,
    name: String,
    tags: Vec<String>,
    request: WorkerRequest,
    outcome: Receiver<WorkerOutcome>,
}

impl SubmissionHandle {
    /// A handle plus the sender its engine reports the outcome on.
    pub fn pending(id: impl Into<String>, request: WorkerRequest) -> (Self, Sender<WorkerOutcome>) {
        let (tx, rx) = mpsc::channel();
        let handle = Self {
            id: id.into(),
            name: request.name(),
            tags: vec![request.instrument.tag()],
            request,
            outcome: rx,
        };
        (handle, tx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn instrument(&self) -> &Instrument {
        &self.request.instrument
    }

    pub fn symbol_index(&self) -> usize {
        self.request.symbol_index
    }

    /// Block until the outcome arrives.
    ///
    /// An engine that drops the work without reporting yields a `Lost` failure.
    pub fn wait(self) -> WorkerOutcome {
        match self.outcome.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(PartitionFailure::new(
                self.request.instrument,
                self.request.symbol_index,
                FailureCause::Lost,
            )),
        }
    }
}

/// Runs partition workers on a private rayon pool.
pub struct LocalExecutor {
    pool: rayon::ThreadPool,
    worker: Arc<PartitionWorker>,
    accepting: AtomicBool,
    next_id: AtomicU64,
}

impl LocalExecutor {
    pub fn new(worker: Arc<PartitionWorker>, max_concurrency: usize) -> Result<Self, SubmitError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_concurrency.max(1))
            .thread_name(|i| format!("fanlab-worker-{i}"))
            .build()
            .map_err(|e| SubmitError::EngineUnavailable(format!("thread pool: {e}")))?;
        info!(threads = pool.current_num_threads(), "local executor started");
        Ok(Self {
            pool,
            worker,
            accepting: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn max_concurrency(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Stop accepting submissions. Work already submitted still completes.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        info!("local executor no longer accepting work");
    }
}

impl ExecutionEngine for LocalExecutor {
    fn submit(&self, request: WorkerRequest) -> Result<SubmissionHandle, SubmitError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SubmitError::EngineUnavailable(
                "local executor has been shut down".into(),
            ));
        }

        let id = format!("sub-{:06}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (handle, tx) = SubmissionHandle::pending(id, request.clone());
        let worker = Arc::clone(&self.worker);

        self.pool.spawn(move || {
            let WorkerRequest {
                instrument,
                symbol_index,
            } = request;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker.run(&instrument, symbol_index)))
                .unwrap_or_else(|payload| {
                    let message = panic_message(&*payload);
                    error!(instrument = %instrument, symbol_index, panic = %message, "partition worker panicked");
                    Err(PartitionFailure::new(
                        instrument.clone(),
                        symbol_index,
                        FailureCause::Panicked(message),
                    ))
                });
            // Receiver gone means nobody is waiting; the output is on disk regardless.
            let _ = tx.send(outcome);
        });

        debug!(id = handle.id(), name = handle.name(), "submitted");
        Ok(handle)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

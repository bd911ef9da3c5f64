//! End-to-end: synthetic inputs → dispatch on the local pool → aggregate.

use std::path::Path;
use std::sync::Arc;

use fanlab_core::data::frame::timestamp_column;
use fanlab_core::data::synthetic::{self, SyntheticConfig};
use fanlab_core::data::{DatasetLayout, DatasetStore, ParquetStore};
use fanlab_core::domain::Instrument;
use fanlab_runner::config::PipelineConfig;
use fanlab_runner::{
    AggregateError, DispatchError, Dispatcher, ExecutionEngine, FailureCause, LocalExecutor, MemoryPublisher,
    Pipeline, SubmissionHandle, SubmitError, WorkerRequest,
};

fn seed_inputs(root: &Path, instruments: usize) {
    let store = ParquetStore::new(root);
    let config = SyntheticConfig {
        instruments,
        trading_days: 3,
        ..SyntheticConfig::default()
    };
    let layout = DatasetLayout::default();
    synthetic::generate(&config, &layout)
        .unwrap()
        .write(&store, &layout)
        .unwrap();
}

fn config_for(dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.data.root = dir.join("data");
    config.output.local_dir = dir.join("results");
    config.retry.max_attempts = 1;
    config.retry.delay_ms = 0;
    config
}

#[test]
fn sentinel_partition_fails_and_the_rest_complete() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(&dir.path().join("data"), 10);
    let publisher = Arc::new(MemoryPublisher::new());
    let pipeline = Pipeline::new(config_for(dir.path())).with_publisher(publisher.clone());

    let outcome = pipeline.run(true).unwrap();
    let summary = &outcome.summary;

    assert_eq!(summary.total(), 10);
    assert_eq!(summary.succeeded.len(), 9);
    assert_eq!(summary.failed.len(), 1);
    let failure = &summary.failed[0];
    assert_eq!(failure.symbol_index, 7);
    assert!(failure.is_injected());
    assert!(matches!(failure.cause, FailureCause::InjectedFault(7)));

    // the failed partition wrote nothing
    assert!(!pipeline.results().exists(failure.instrument.as_str()));
    for s in &summary.succeeded {
        assert!(pipeline.results().exists(s.instrument.as_str()));
        assert_eq!(s.records, 23);
    }

    let portfolio = outcome
        .portfolio
        .expect("aggregation requested")
        .expect("aggregated");
    assert_eq!(portfolio.partitions_loaded, 9);
    assert_eq!(portfolio.missing_instruments, vec![failure.instrument.clone()]);
    assert_eq!(portfolio.total_records, 9 * 23);
    assert_eq!(
        portfolio.good_trades + portfolio.bad_trades + portfolio.neutral_trades,
        portfolio.evaluable_records()
    );
    assert_eq!(portfolio.unevaluable_records, 9);
    // partitions were computed over the full series, so nothing to reconcile
    assert_eq!(portfolio.label_disagreements, 0);

    for key in [
        "validation-summary",
        "orchestrator-summary",
        "run-summary",
        "portfolio-summary",
    ] {
        assert!(publisher.get(key).is_some(), "missing {key}");
    }
    assert_eq!(
        publisher
            .keys()
            .iter()
            .filter(|k| k.ends_with("-analysis-summary"))
            .count(),
        9
    );
}

#[test]
fn rerun_reproduces_identical_records() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(&dir.path().join("data"), 3);
    let pipeline = Pipeline::new(config_for(dir.path()));

    let hashes = |outcome: &fanlab_runner::RunOutcome| {
        let mut h: Vec<(String, String)> = outcome
            .summary
            .succeeded
            .iter()
            .map(|s| (s.instrument.to_string(), s.records_hash.clone()))
            .collect();
        h.sort();
        h
    };
    let first = pipeline.run(false).unwrap();
    let second = pipeline.run(false).unwrap();
    assert_eq!(first.summary.succeeded.len(), 3);
    assert_eq!(hashes(&first), hashes(&second));
}

#[test]
fn missing_side_series_blocks_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    seed_inputs(&data, 3);
    std::fs::remove_file(ParquetStore::new(&data).path("vix_hourly")).unwrap();

    let err = Pipeline::new(config_for(dir.path())).run(false).unwrap_err();
    match err {
        fanlab_runner::PipelineError::Dispatch(DispatchError::ValidationFailed { report }) => {
            assert!(!report.critical.is_empty());
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

/// Engine that cannot reach its backend for one instrument.
struct PartlyDown {
    inner: LocalExecutor,
    down_for: Instrument,
}

impl ExecutionEngine for PartlyDown {
    fn submit(&self, request: WorkerRequest) -> Result<SubmissionHandle, SubmitError> {
        if request.instrument == self.down_for {
            return Err(SubmitError::EngineUnavailable("connection refused".into()));
        }
        self.inner.submit(request)
    }
}

#[test]
fn submission_failure_does_not_block_other_instruments() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(&dir.path().join("data"), 4);
    let mut config = config_for(dir.path());
    config.dispatch.fault_injection = false;
    let pipeline = Pipeline::new(config);

    let engine = PartlyDown {
        inner: LocalExecutor::new(Arc::new(pipeline.worker()), 2).unwrap(),
        down_for: Instrument::new("MSFT"),
    };
    let report = Dispatcher::new(pipeline.partitioner(), Arc::new(engine))
        .run(None)
        .unwrap();
    assert_eq!(report.submissions.len(), 4);
    assert_eq!(report.submitted(), 3);

    let summary = report.wait_all();
    assert_eq!(summary.succeeded.len(), 3);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.not_submitted.len(), 1);
    assert_eq!(summary.not_submitted[0].0, Instrument::new("MSFT"));
}

#[test]
fn shut_down_executor_rejects_submissions() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(&dir.path().join("data"), 2);
    let pipeline = Pipeline::new(config_for(dir.path()));

    let executor = LocalExecutor::new(Arc::new(pipeline.worker()), 1).unwrap();
    assert_eq!(executor.max_concurrency(), 1);
    executor.shutdown();
    let err = executor
        .submit(WorkerRequest::new(Instrument::new("AAPL"), 0))
        .unwrap_err();
    assert!(matches!(err, SubmitError::EngineUnavailable(_)));
}

#[test]
fn failed_aggregation_keeps_the_run_summary() {
    let dir = tempfile::tempdir().unwrap();
    seed_inputs(&dir.path().join("data"), 3);
    let mut config = config_for(dir.path());
    config.dispatch.num_instruments = Some(1);
    config.dispatch.fault_sentinel = 0;

    let outcome = Pipeline::new(config).run(true).unwrap();
    assert_eq!(outcome.summary.total(), 1);
    assert!(outcome.summary.succeeded.is_empty());
    assert_eq!(outcome.summary.failed.len(), 1);
    assert!(outcome.summary.failed[0].is_injected());
    assert!(matches!(
        outcome.portfolio,
        Some(Err(AggregateError::NoResultsFound { .. }))
    ));
}

fn write_series(store: &ParquetStore, name: &str, ts: &[i64], cols: &[(&str, Vec<f64>)]) {
    let mut columns = vec![timestamp_column("timestamp", ts.to_vec()).unwrap()];
    for (col, values) in cols {
        columns.push(polars::prelude::Column::new((*col).into(), values.clone()));
    }
    store
        .write(name, &mut polars::prelude::DataFrame::new(columns).unwrap())
        .unwrap();
}

#[test]
fn tolerated_duplicate_timestamp_does_not_fail_partitions() {
    const HOUR: i64 = 3_600_000;
    let dir = tempfile::tempdir().unwrap();
    let data = ParquetStore::new(dir.path().join("data"));
    let ts = [0, HOUR, HOUR, 2 * HOUR, 3 * HOUR];
    write_series(
        &data,
        "spx_holdings_hourly",
        &ts,
        &[
            ("AAPL", vec![100.0, 101.0, 101.5, 100.5, 102.0]),
            ("MSFT", vec![300.0, 302.0, 301.0, 299.0, 303.0]),
            ("SPX", vec![4000.0, 4010.0, 4012.0, 4005.0, 4020.0]),
        ],
    );
    write_series(&data, "vix_hourly", &ts, &[("VIX", vec![15.0, 16.0, 16.0, 17.0, 15.5])]);
    write_series(
        &data,
        "spx_hourly",
        &ts,
        &[("SPX", vec![4000.0, 4010.0, 4012.0, 4005.0, 4020.0])],
    );

    let mut config = config_for(dir.path());
    config.dispatch.fault_injection = false;
    config.validation.duplicate_tolerance = 1;

    let outcome = Pipeline::new(config).run(false).unwrap();
    assert_eq!(outcome.summary.succeeded.len(), 2);
    assert!(outcome.summary.failed.is_empty());
    for s in &outcome.summary.succeeded {
        assert_eq!(s.records, 3);
    }
}

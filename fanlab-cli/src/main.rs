//! fanlab CLI: data preparation, partitioned runs and aggregation.
//!
//! Commands:
//! - `generate`: write deterministic synthetic input datasets
//! - `ingest`: fetch closes from Yahoo Finance into the input datasets
//! - `validate`: pre-flight data validation report
//! - `analyze`: run a single partition worker
//! - `run`: validate, dispatch every partition, wait, optionally aggregate
//! - `aggregate`: portfolio metrics over persisted partition outputs

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use fanlab_core::data::synthetic::{self, SyntheticConfig};
use fanlab_core::data::{
    ingest_market_data, IngestRequest, Interval, ParquetStore, ValidationStatus,
    YahooProvider,
};
use fanlab_core::domain::Instrument;
use fanlab_runner::export::export_portfolio;
use fanlab_runner::publish::{publish_or_warn, TracingPublisher};
use fanlab_runner::{
    reports, telemetry, MarkdownPublisher, Pipeline, PipelineConfig, PortfolioMetrics,
    QualityReconciliation, RunEnvironment, RunSummary, SummaryPublisher,
};

#[derive(Parser)]
#[command(
    name = "fanlab",
    about = "fanlab: partitioned signal analysis over an instrument universe"
)]
struct Cli {
    /// Path to a TOML pipeline config. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log summaries instead of writing them to the reports directory.
    #[arg(long, global = true, default_value_t = false)]
    no_reports: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write seeded synthetic holdings, volatility and market datasets.
    Generate {
        #[arg(long, default_value_t = 10)]
        instruments: usize,

        /// Weekdays of eight hourly sessions each.
        #[arg(long, default_value_t = 20)]
        days: usize,

        /// First session date (YYYY-MM-DD).
        #[arg(long, default_value = "2024-01-02")]
        start: String,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Fetch closes from Yahoo Finance and write the input datasets.
    Ingest {
        /// Symbols to fetch (e.g., AAPL MSFT NVDA).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to 30 days ago.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Bar interval: 1h or 1d.
        #[arg(long, default_value = "1h")]
        interval: Interval,
    },
    /// Validate the input datasets and print the report.
    Validate,
    /// Analyze one instrument.
    Analyze {
        instrument: String,

        /// Symbol index passed to the worker (the fault sentinel applies).
        #[arg(long, default_value_t = 0)]
        index: usize,
    },
    /// Validate, dispatch every partition and wait for all of them.
    Run {
        /// Output environment: local or cluster.
        #[arg(long)]
        env: Option<RunEnvironment>,

        /// Analyze only the first N instruments (0 = all).
        #[arg(long)]
        num_instruments: Option<usize>,

        /// Disable the fault-injection sentinel.
        #[arg(long, default_value_t = false)]
        no_fault: bool,

        /// Aggregate once every partition has reported.
        #[arg(long, default_value_t = false)]
        aggregate: bool,
    },
    /// Aggregate persisted partition outputs into portfolio metrics.
    Aggregate {
        /// Result location. Defaults to the configured environment's directory.
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Restrict to these instruments.
        #[arg(long, value_delimiter = ',')]
        instruments: Vec<String>,

        /// Label reconciliation: recompute or reuse_partition.
        #[arg(long)]
        quality: Option<QualityReconciliation>,

        /// Write metrics.json, instruments.csv and timestamps.csv here.
        #[arg(long)]
        export: Option<PathBuf>,

        /// Print the full metrics as JSON instead of the text summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let publisher: Arc<dyn SummaryPublisher> = if cli.no_reports {
        Arc::new(TracingPublisher)
    } else {
        Arc::new(MarkdownPublisher::new(&config.output.reports_dir))
    };

    match cli.command {
        Commands::Generate {
            instruments,
            days,
            start,
            seed,
        } => run_generate(&config, instruments, days, &start, seed),
        Commands::Ingest {
            symbols,
            start,
            end,
            interval,
        } => run_ingest(&config, symbols, start, end, interval),
        Commands::Validate => run_validate(config, publisher),
        Commands::Analyze { instrument, index } => run_analyze(config, publisher, &instrument, index),
        Commands::Run {
            env,
            num_instruments,
            no_fault,
            aggregate,
        } => run_pipeline(config, publisher, env, num_instruments, no_fault, aggregate),
        Commands::Aggregate {
            results_dir,
            instruments,
            quality,
            export,
            json,
        } => run_aggregate(config, publisher, results_dir, instruments, quality, export, json),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let config = PipelineConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            info!(path = %path.display(), "config loaded");
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}

fn pipeline(config: PipelineConfig, publisher: Arc<dyn SummaryPublisher>) -> Pipeline {
    Pipeline::new(config).with_publisher(publisher)
}

fn run_generate(
    config: &PipelineConfig,
    instruments: usize,
    days: usize,
    start: &str,
    seed: u64,
) -> Result<()> {
    if instruments == 0 || days == 0 {
        bail!("--instruments and --days must be at least 1");
    }
    let synthetic_config = SyntheticConfig {
        instruments,
        trading_days: days,
        start: parse_date(start)?,
        seed,
    };
    let layout = config.data.layout();
    let store = ParquetStore::new(&config.data.root);

    let mut market = synthetic::generate(&synthetic_config, &layout)
        .context("failed to generate synthetic data")?;
    let locations = market
        .write(&store, &layout)
        .context("failed to write synthetic datasets")?;

    println!(
        "Generated {} instruments × {} timestamps (seed {seed})",
        market.instruments.len(),
        market.timestamp_count()
    );
    for location in locations {
        println!("  {location}");
    }
    Ok(())
}

fn run_ingest(
    config: &PipelineConfig,
    symbols: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    interval: Interval,
) -> Result<()> {
    let end = match end {
        Some(s) => parse_date(&s)?,
        None => chrono::Utc::now().date_naive(),
    };
    let start = match start {
        Some(s) => parse_date(&s)?,
        None => end - chrono::Duration::days(30),
    };
    if start >= end {
        bail!("--start must be before --end");
    }

    let provider = YahooProvider::new(config.retry.policy()).context("failed to build HTTP client")?;
    let store = ParquetStore::new(&config.data.root);
    let request = IngestRequest {
        symbols,
        start,
        end,
        interval,
    };
    let summary = ingest_market_data(&provider, &store, &config.data.layout(), &request)
        .context("ingest failed")?;

    println!(
        "Ingested {} symbols ({} holdings rows, {} volatility rows, {} market rows)",
        summary.succeeded.len(),
        summary.holdings_records,
        summary.volatility_records,
        summary.market_records
    );
    for (symbol, err) in &summary.failed {
        eprintln!("Error for {symbol}: {err}");
    }
    if summary.succeeded.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_validate(config: PipelineConfig, publisher: Arc<dyn SummaryPublisher>) -> Result<()> {
    let report = Pipeline::new(config).validator().validate();
    let markdown = reports::validation_summary(&report);
    publish_or_warn(publisher.as_ref(), "validation-summary", &markdown);
    print!("{markdown}");
    if report.status == ValidationStatus::Fail {
        std::process::exit(1);
    }
    Ok(())
}

fn run_analyze(
    config: PipelineConfig,
    publisher: Arc<dyn SummaryPublisher>,
    instrument: &str,
    index: usize,
) -> Result<()> {
    let worker = pipeline(config, publisher).worker();
    match worker.run(&Instrument::new(instrument), index) {
        Ok(summary) => {
            print!("{}", reports::partition_summary(&summary));
            Ok(())
        }
        Err(failure) => {
            eprintln!("{failure}");
            std::process::exit(1);
        }
    }
}

fn run_pipeline(
    mut config: PipelineConfig,
    publisher: Arc<dyn SummaryPublisher>,
    env: Option<RunEnvironment>,
    num_instruments: Option<usize>,
    no_fault: bool,
    aggregate: bool,
) -> Result<()> {
    if let Some(env) = env {
        config.output.environment = env;
    }
    if num_instruments.is_some() {
        config.dispatch.num_instruments = num_instruments;
    }
    if no_fault {
        config.dispatch.fault_injection = false;
    }
    println!(
        "Environment: {} → results in {}",
        config.output.environment,
        config.result_dir().display()
    );

    let outcome = pipeline(config, publisher).run(aggregate).context("pipeline run failed")?;
    print_run_summary(&outcome.summary);
    let mut failed = outcome.summary.succeeded.is_empty();
    match &outcome.portfolio {
        Some(Ok(metrics)) => print_portfolio(metrics),
        Some(Err(e)) => {
            eprintln!("aggregation failed: {e}");
            failed = true;
        }
        None => {}
    }
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_aggregate(
    mut config: PipelineConfig,
    publisher: Arc<dyn SummaryPublisher>,
    results_dir: Option<PathBuf>,
    instruments: Vec<String>,
    quality: Option<QualityReconciliation>,
    export: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    if let Some(quality) = quality {
        config.aggregate.quality = quality;
    }
    let location = results_dir.unwrap_or_else(|| config.result_dir().to_path_buf());
    let filter: Vec<Instrument> = instruments.into_iter().map(Instrument::from).collect();
    let filter = (!filter.is_empty()).then_some(filter.as_slice());

    let metrics = pipeline(config, publisher)
        .aggregator()
        .run(&location, filter)
        .with_context(|| format!("aggregation over {} failed", location.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        print_portfolio(&metrics);
    }

    if let Some(dir) = export {
        export_portfolio(&dir, &metrics)?;
        println!("Exported to: {}", dir.display());
    }
    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    println!("\n=== Run Summary ===");
    println!("Partitions:     {}", summary.total());
    println!("Succeeded:      {}", summary.succeeded.len());
    println!("Failed:         {}", summary.failed.len());
    println!("Not submitted:  {}", summary.not_submitted.len());
    for f in &summary.failed {
        println!("  ✗ {} [{}] {}", f.instrument, f.cause.kind(), f.cause);
    }
    for (instrument, e) in &summary.not_submitted {
        println!("  ✗ {instrument} [not_submitted] {e}");
    }
}

fn print_portfolio(m: &PortfolioMetrics) {
    println!("\n=== Portfolio ===");
    println!("Instruments:    {}", m.total_instruments);
    println!("Records:        {}", m.total_records);
    println!(
        "Trades:         {} ({} good, {} bad, {} neutral)",
        m.total_trades, m.good_trades, m.bad_trades, m.neutral_trades
    );
    println!("Win rate:       {:.2}%", m.win_rate);
    println!("Total P&L:      {:.4}%", m.total_pnl);
    println!("Avg P&L/trade:  {:.4}%", m.avg_pnl);
    println!("Sharpe:         {:.3}", m.sharpe_ratio);
    println!("Avg beta:       {:.3}", m.avg_beta);
    println!("Avg volatility: {:.2}", m.avg_volatility);
    println!("Relabelled:     {}", m.label_disagreements);
    if !m.failed_partitions.is_empty() {
        println!("Unreadable:     {}", m.failed_partitions.len());
    }
    if !m.missing_instruments.is_empty() {
        let names: Vec<String> = m.missing_instruments.iter().map(|i| i.to_string()).collect();
        println!("Missing:        {}", names.join(", "));
    }
}

//! Markdown summaries handed to the [`SummaryPublisher`](crate::publish::SummaryPublisher).

use fanlab_core::data::{ValidationReport, ValidationStatus};

use crate::aggregator::PortfolioMetrics;
use crate::dispatcher::{DispatchReport, RunSummary};
use crate::worker::PartitionSummary;

/// Rows shown in the per-instrument and per-timestamp tables.
const ROLLUP_ROWS: usize = 20;

fn timestamp_or_dash(ts: Option<fanlab_core::domain::Timestamp>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Summary of one completed partition.
pub fn partition_summary(summary: &PartitionSummary) -> String {
    let c = &summary.counters;
    let mut md = String::with_capacity(512);

    md.push_str(&format!("# Analysis: {}\n\n", summary.instrument));
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Symbol Index | {} |\n", summary.symbol_index));
    md.push_str(&format!("| Records | {} |\n", summary.records));
    md.push_str(&format!("| Total Trades | {} |\n", c.total_trades));
    md.push_str(&format!("| Good Trades | {} |\n", c.good_trades));
    md.push_str(&format!("| Bad Trades | {} |\n", c.bad_trades));
    md.push_str(&format!("| Win Rate | {:.2}% |\n", c.win_rate));
    md.push_str(&format!("| Avg Beta | {:.3} |\n", c.avg_beta));
    md.push_str(&format!("| Avg Volatility | {:.2} |\n", c.avg_volatility));
    md.push_str(&format!("| Output | `{}` |\n", summary.output_path));
    md.push_str(&format!("| Records Hash | `{}` |\n", summary.records_hash));
    md
}

/// Submission overview written by the dispatcher right after fan-out.
pub fn orchestrator_summary(report: &DispatchReport) -> String {
    let mut md = String::with_capacity(1024);

    md.push_str("# Orchestrator Summary\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!(
        "| Instruments | {} of {} |\n",
        report.submissions.len(),
        report.available_instruments
    ));
    md.push_str(&format!("| Timestamps | {} |\n", report.timestamp_count));
    md.push_str(&format!("| Submitted | {} |\n", report.submitted()));
    md.push_str(&format!(
        "| Submission Failures | {} |\n",
        report.submissions.len() - report.submitted()
    ));
    if let Some(v) = &report.validation {
        md.push_str(&format!("| Validation | {} |\n", v.status));
    }
    md.push('\n');

    md.push_str("## Submissions\n\n");
    md.push_str("| # | Instrument | Submission | Name |\n");
    md.push_str("| ---: | --- | --- | --- |\n");
    for s in &report.submissions {
        let (id, name) = match &s.result {
            Ok(handle) => (handle.id().to_string(), handle.name().to_string()),
            Err(e) => (format!("**failed**: {e}"), "-".to_string()),
        };
        md.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            s.symbol_index, s.instrument, id, name
        ));
    }
    md
}

/// Final outcome of every partition after the run has drained.
pub fn run_summary(summary: &RunSummary) -> String {
    let mut md = String::with_capacity(1024);

    md.push_str("# Run Summary\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Partitions | {} |\n", summary.total()));
    md.push_str(&format!("| Succeeded | {} |\n", summary.succeeded.len()));
    md.push_str(&format!("| Failed | {} |\n", summary.failed.len()));
    md.push_str(&format!("| Not Submitted | {} |\n", summary.not_submitted.len()));
    md.push('\n');

    if !summary.succeeded.is_empty() {
        md.push_str("## Succeeded\n\n");
        md.push_str("| # | Instrument | Trades | Win Rate | Avg Beta |\n");
        md.push_str("| ---: | --- | ---: | ---: | ---: |\n");
        for s in &summary.succeeded {
            md.push_str(&format!(
                "| {} | {} | {} | {:.2}% | {:.3} |\n",
                s.symbol_index,
                s.instrument,
                s.total_trades(),
                s.success_rate(),
                s.avg_beta()
            ));
        }
        md.push('\n');
    }

    if !summary.failed.is_empty() || !summary.not_submitted.is_empty() {
        md.push_str("## Failed\n\n");
        md.push_str("| Instrument | Kind | Error |\n");
        md.push_str("| --- | --- | --- |\n");
        for f in &summary.failed {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                f.instrument,
                f.cause.kind(),
                f.cause
            ));
        }
        for (instrument, e) in &summary.not_submitted {
            md.push_str(&format!("| {instrument} | not_submitted | {e} |\n"));
        }
    }
    md
}

pub fn validation_summary(report: &ValidationReport) -> String {
    let mut md = String::with_capacity(1024);

    md.push_str("# Data Validation\n\n");
    let badge = match report.status {
        ValidationStatus::Pass => "PASS",
        ValidationStatus::Warn => "WARN",
        ValidationStatus::Fail => "**FAIL**",
    };
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!("| Status | {badge} |\n"));
    md.push_str(&format!("| Records | {} |\n", report.total_records));
    md.push_str(&format!("| Columns | {} |\n", report.total_columns));
    md.push_str(&format!(
        "| Duplicate Timestamps | {} |\n",
        report.duplicate_timestamps
    ));
    md.push_str(&format!("| Volatility Records | {} |\n", report.volatility_records));
    md.push_str(&format!("| Market Records | {} |\n", report.market_records));
    md.push('\n');

    if !report.critical.is_empty() {
        md.push_str("## Critical\n\n");
        for issue in &report.critical {
            md.push_str(&format!("- {issue}\n"));
        }
        md.push('\n');
    }
    if !report.warnings.is_empty() {
        md.push_str("## Warnings\n\n");
        for issue in &report.warnings {
            md.push_str(&format!("- {issue}\n"));
        }
        md.push('\n');
    }
    if !report.outliers.is_empty() {
        md.push_str("## Outliers\n\n");
        md.push_str("| Instrument | Count | Max z |\n");
        md.push_str("| --- | ---: | ---: |\n");
        for o in &report.outliers {
            md.push_str(&format!(
                "| {} | {} | {:.2} |\n",
                o.instrument, o.outliers, o.max_z
            ));
        }
    }
    md
}

pub fn portfolio_summary(m: &PortfolioMetrics) -> String {
    let mut md = String::with_capacity(4096);

    md.push_str("# Portfolio Summary\n\n");
    md.push_str("| Field | Value |\n");
    md.push_str("| --- | --- |\n");
    md.push_str(&format!(
        "| Period | {} to {} |\n",
        timestamp_or_dash(m.start),
        timestamp_or_dash(m.end)
    ));
    md.push_str(&format!("| Instruments | {} |\n", m.total_instruments));
    md.push_str(&format!("| Timestamps | {} |\n", m.total_timestamps));
    md.push_str(&format!("| Records | {} |\n", m.total_records));
    md.push_str(&format!("| Trades | {} |\n", m.total_trades));
    md.push_str(&format!(
        "| Good / Bad / Neutral | {} / {} / {} |\n",
        m.good_trades, m.bad_trades, m.neutral_trades
    ));
    md.push_str(&format!("| Unevaluable | {} |\n", m.unevaluable_records));
    md.push_str(&format!("| Win Rate | {:.2}% |\n", m.win_rate));
    md.push_str(&format!("| Total P&L | {:.4}% |\n", m.total_pnl));
    md.push_str(&format!("| Avg P&L / Trade | {:.4}% |\n", m.avg_pnl));
    md.push_str(&format!("| Sharpe | {:.3} |\n", m.sharpe_ratio));
    md.push_str(&format!("| Avg Beta | {:.3} |\n", m.avg_beta));
    md.push_str(&format!("| Avg Volatility | {:.2} |\n", m.avg_volatility));
    md.push_str(&format!(
        "| Label Reconciliation | {:?} ({} changed) |\n",
        m.quality_mode, m.label_disagreements
    ));
    md.push_str(&format!(
        "| Partitions | {} loaded, {} unreadable |\n",
        m.partitions_loaded,
        m.failed_partitions.len()
    ));
    md.push('\n');

    if !m.missing_instruments.is_empty() || !m.failed_partitions.is_empty() {
        md.push_str("## Missing Partitions\n\n");
        for i in &m.missing_instruments {
            md.push_str(&format!("- {i}: no output\n"));
        }
        for f in &m.failed_partitions {
            md.push_str(&format!("- {}: {}\n", f.name, f.reason));
        }
        md.push('\n');
    }

    md.push_str("## Instruments\n\n");
    md.push_str("| Instrument | Trades | Good | Bad | Win Rate | Avg Beta | Avg Return | P&L |\n");
    md.push_str("| --- | ---: | ---: | ---: | ---: | ---: | ---: | ---: |\n");
    for r in m.instruments.iter().take(ROLLUP_ROWS) {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {:.2}% | {:.3} | {:.4}% | {:.4}% |\n",
            r.instrument, r.trades, r.good, r.bad, r.win_rate, r.avg_beta, r.avg_return, r.total_pnl
        ));
    }
    if m.instruments.len() > ROLLUP_ROWS {
        md.push_str(&format!(
            "\n_{} more instruments in the CSV export._\n",
            m.instruments.len() - ROLLUP_ROWS
        ));
    }
    md.push('\n');

    md.push_str("## Most Active Timestamps\n\n");
    let mut busiest: Vec<_> = m.timestamps.iter().collect();
    busiest.sort_by(|a, b| b.trades.cmp(&a.trades).then(a.timestamp.cmp(&b.timestamp)));
    md.push_str("| Timestamp | Trades | Win Rate | Avg Volatility | Avg Return |\n");
    md.push_str("| --- | ---: | ---: | ---: | ---: |\n");
    for t in busiest.into_iter().take(ROLLUP_ROWS) {
        md.push_str(&format!(
            "| {} | {} | {:.2}% | {:.2} | {:.4}% |\n",
            t.timestamp.format("%Y-%m-%d %H:%M"),
            t.trades,
            t.win_rate,
            t.avg_volatility,
            t.avg_return
        ));
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::PartitionCounters;
    use fanlab_core::domain::Instrument;

    #[test]
    fn partition_summary_has_headline_fields() {
        let summary = PartitionSummary {
            instrument: Instrument::new("AAPL"),
            symbol_index: 3,
            output_path: "out/AAPL.parquet".into(),
            records: 10,
            counters: PartitionCounters {
                total_trades: 4,
                good_trades: 3,
                bad_trades: 1,
                win_rate: 75.0,
                avg_beta: 1.2,
                avg_volatility: 16.0,
            },
            records_hash: "abc".into(),
        };
        let md = partition_summary(&summary);
        assert!(md.starts_with("# Analysis: AAPL"));
        assert!(md.contains("| Win Rate | 75.00% |"));
        assert!(md.contains("| Total Trades | 4 |"));
    }

    #[test]
    fn failing_validation_lists_critical_issues() {
        let report = ValidationReport {
            status: ValidationStatus::Fail,
            critical: vec!["Missing required market data".into()],
            warnings: vec![],
            total_records: 0,
            total_columns: 0,
            duplicate_timestamps: 0,
            missing_values: vec![],
            outliers: vec![],
            volatility_records: 0,
            market_records: 0,
        };
        let md = validation_summary(&report);
        assert!(md.contains("**FAIL**"));
        assert!(md.contains("- Missing required market data"));
    }
}

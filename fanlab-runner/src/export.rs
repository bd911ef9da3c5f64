//! Export of portfolio metrics: JSON for the headline numbers and CSV for
//! the rollup tables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::aggregator::{InstrumentRollup, PortfolioMetrics, TimestampRollup};

/// Files written by [`export_portfolio`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPaths {
    pub metrics: PathBuf,
    pub instruments: PathBuf,
    pub timestamps: PathBuf,
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_metrics_json(metrics: &PortfolioMetrics) -> Result<String> {
    serde_json::to_string_pretty(metrics).context("failed to serialize PortfolioMetrics to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: instrument, records, trades, good, bad, win_rate, avg_beta,
/// avg_return, total_pnl
pub fn export_instruments_csv(rows: &[InstrumentRollup]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "instrument",
        "records",
        "trades",
        "good",
        "bad",
        "win_rate",
        "avg_beta",
        "avg_return",
        "total_pnl",
    ])?;

    for r in rows {
        wtr.write_record([
            &r.instrument.to_string(),
            &r.records.to_string(),
            &r.trades.to_string(),
            &r.good.to_string(),
            &r.bad.to_string(),
            &format!("{:.4}", r.win_rate),
            &format!("{:.6}", r.avg_beta),
            &format!("{:.6}", r.avg_return),
            &format!("{:.6}", r.total_pnl),
        ])?;
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

/// Columns: timestamp, records, trades, good, bad, win_rate,
/// avg_volatility, avg_return
pub fn export_timestamps_csv(rows: &[TimestampRollup]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "timestamp",
        "records",
        "trades",
        "good",
        "bad",
        "win_rate",
        "avg_volatility",
        "avg_return",
    ])?;

    for t in rows {
        wtr.write_record([
            &t.timestamp.to_rfc3339(),
            &t.records.to_string(),
            &t.trades.to_string(),
            &t.good.to_string(),
            &t.bad.to_string(),
            &format!("{:.4}", t.win_rate),
            &format!("{:.4}", t.avg_volatility),
            &format!("{:.6}", t.avg_return),
        ])?;
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not valid UTF-8")
}

// ─── Directory export ───────────────────────────────────────────────

/// Write `metrics.json`, `instruments.csv` and `timestamps.csv` into `dir`.
pub fn export_portfolio(dir: &Path, metrics: &PortfolioMetrics) -> Result<ExportPaths> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;

    let paths = ExportPaths {
        metrics: dir.join("metrics.json"),
        instruments: dir.join("instruments.csv"),
        timestamps: dir.join("timestamps.csv"),
    };
    write(&paths.metrics, &export_metrics_json(metrics)?)?;
    write(&paths.instruments, &export_instruments_csv(&metrics.instruments)?)?;
    write(&paths.timestamps, &export_timestamps_csv(&metrics.timestamps)?)?;
    Ok(paths)
}

fn write(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fanlab_core::domain::{millis_to_timestamp, Instrument};

    fn rollup(name: &str, win_rate: f64) -> InstrumentRollup {
        InstrumentRollup {
            instrument: Instrument::new(name),
            records: 10,
            trades: 4,
            good: 3,
            bad: 1,
            win_rate,
            avg_beta: 1.1,
            avg_return: 0.02,
            total_pnl: 1.5,
        }
    }

    #[test]
    fn instruments_csv_has_header_and_rows() {
        let csv = export_instruments_csv(&[rollup("AAPL", 75.0), rollup("MSFT", 50.0)]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("instrument,records,trades"));
        assert!(lines[1].starts_with("AAPL,10,4,3,1,75.0000"));
    }

    #[test]
    fn timestamps_csv_uses_rfc3339() {
        let row = TimestampRollup {
            timestamp: millis_to_timestamp(0).unwrap(),
            records: 2,
            trades: 1,
            good: 1,
            bad: 0,
            win_rate: 100.0,
            avg_volatility: 15.0,
            avg_return: 0.5,
        };
        let csv = export_timestamps_csv(&[row]).unwrap();
        assert!(csv.contains("1970-01-01T00:00:00+00:00,2,1,1,0"));
    }
}

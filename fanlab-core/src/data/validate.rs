//! Pre-flight validation of the input datasets.
//!
//! Findings are either warnings (missing instrument values, price-change
//! outliers) or critical (unusable market series, duplicate timestamps beyond
//! tolerance, non-positive prices). Any critical finding fails the run before
//! dispatch.

use super::context::DatasetLayout;
use super::frame;
use super::quality::count_duplicates;
use super::store::DatasetStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Pass,
    Warn,
    Fail,
}

impl ValidationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationStatus::Pass => "PASS",
            ValidationStatus::Warn => "WARN",
            ValidationStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// |z| above which a price change counts as an outlier.
    pub outlier_z: f64,
    /// Duplicate timestamps tolerated before the run is failed.
    pub duplicate_tolerance: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            outlier_z: 3.0,
            duplicate_tolerance: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingValues {
    pub column: String,
    pub missing: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierSummary {
    pub instrument: String,
    pub outliers: usize,
    pub max_z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub critical: Vec<String>,
    pub warnings: Vec<String>,
    pub total_records: usize,
    pub total_columns: usize,
    pub duplicate_timestamps: usize,
    pub missing_values: Vec<MissingValues>,
    pub outliers: Vec<OutlierSummary>,
    pub volatility_records: usize,
    pub market_records: usize,
}

impl ValidationReport {
    /// Critical findings followed by warnings.
    pub fn issues(&self) -> Vec<String> {
        self.critical
            .iter()
            .chain(self.warnings.iter())
            .cloned()
            .collect()
    }

    pub fn passed(&self) -> bool {
        self.status != ValidationStatus::Fail
    }
}

pub struct Validator {
    store: Arc<dyn DatasetStore>,
    layout: DatasetLayout,
    config: ValidationConfig,
}

#[derive(Default)]
struct HoldingsFindings {
    total_records: usize,
    total_columns: usize,
    duplicate_timestamps: usize,
    missing_values: Vec<MissingValues>,
    outliers: Vec<OutlierSummary>,
    critical: Vec<String>,
}

impl Validator {
    pub fn new(store: Arc<dyn DatasetStore>, layout: DatasetLayout, config: ValidationConfig) -> Self {
        Self {
            store,
            layout,
            config,
        }
    }

    pub fn validate(&self) -> ValidationReport {
        let holdings = self.check_holdings();
        let mut critical = holdings.critical;
        let mut warnings = Vec::new();

        let (volatility_records, vol_issues) =
            self.check_side_series("Volatility", &self.layout.volatility, &self.layout.volatility_column);
        let (market_records, market_issues) =
            self.check_side_series("Market", &self.layout.market, &self.layout.market_column);
        critical.extend(vol_issues);
        critical.extend(market_issues);
        if volatility_records == 0 || market_records == 0 {
            critical.push("Missing required market data (volatility or market index)".into());
        }

        if !holdings.missing_values.is_empty() {
            warnings.push(format!(
                "{} column(s) have missing values",
                holdings.missing_values.len()
            ));
        }
        if !holdings.outliers.is_empty() {
            warnings.push(format!(
                "{} instrument(s) have price outliers",
                holdings.outliers.len()
            ));
        }
        if holdings.duplicate_timestamps > 0
            && holdings.duplicate_timestamps <= self.config.duplicate_tolerance
        {
            warnings.push(format!(
                "{} duplicate timestamp(s) within tolerance",
                holdings.duplicate_timestamps
            ));
        }

        let status = if !critical.is_empty() {
            ValidationStatus::Fail
        } else if !warnings.is_empty() {
            ValidationStatus::Warn
        } else {
            ValidationStatus::Pass
        };

        for issue in &critical {
            warn!(issue = %issue, "validation: critical");
        }
        info!(
            status = %status,
            critical = critical.len(),
            warnings = warnings.len(),
            "validation complete"
        );

        ValidationReport {
            status,
            critical,
            warnings,
            total_records: holdings.total_records,
            total_columns: holdings.total_columns,
            duplicate_timestamps: holdings.duplicate_timestamps,
            missing_values: holdings.missing_values,
            outliers: holdings.outliers,
            volatility_records,
            market_records,
        }
    }

    fn check_holdings(&self) -> HoldingsFindings {
        let mut findings = HoldingsFindings::default();
        let dataset = &self.layout.holdings;

        let df = match self.store.read(dataset) {
            Ok(df) => df,
            Err(e) => {
                findings
                    .critical
                    .push(format!("Failed to load holdings: {e}"));
                return findings;
            }
        };
        findings.total_records = df.height();

        match frame::timestamp_millis(&df, &self.layout.timestamp_column) {
            Ok(ts) => {
                findings.duplicate_timestamps = count_duplicates(ts.into_iter().flatten());
                if findings.duplicate_timestamps > self.config.duplicate_tolerance {
                    findings.critical.push(format!(
                        "{} duplicate timestamp(s) exceed tolerance of {}",
                        findings.duplicate_timestamps, self.config.duplicate_tolerance
                    ));
                }
            }
            Err(e) => findings
                .critical
                .push(format!("Unusable timestamp column: {e}")),
        }

        for column in frame::column_names(&df) {
            if column == self.layout.timestamp_column {
                continue;
            }
            findings.total_columns += 1;

            let values = match frame::f64_values(&df, &column) {
                Ok(v) => v,
                Err(e) => {
                    findings.critical.push(format!("Column '{column}': {e}"));
                    continue;
                }
            };

            let missing = values.iter().filter(|v| v.is_none()).count();
            if missing > 0 {
                findings.missing_values.push(MissingValues {
                    column: column.clone(),
                    missing,
                    percent: missing as f64 / values.len() as f64 * 100.0,
                });
            }

            let prices: Vec<f64> = values.into_iter().flatten().collect();
            let invalid = prices.iter().filter(|p| !p.is_finite() || **p <= 0.0).count();
            if invalid > 0 {
                findings
                    .critical
                    .push(format!("Column '{column}' has {invalid} non-positive price(s)"));
                continue;
            }

            if column != self.layout.market_column {
                if let Some(summary) = outliers(&column, &prices, self.config.outlier_z) {
                    findings.outliers.push(summary);
                }
            }
        }

        findings
    }

    /// Record count and critical issues of a volatility or market series.
    fn check_side_series(&self, label: &str, dataset: &str, column: &str) -> (usize, Vec<String>) {
        let df = match self.store.read(dataset) {
            Ok(df) => df,
            Err(e) => return (0, vec![format!("Failed to load {label}: {e}")]),
        };
        match frame::f64_values(&df, column) {
            Ok(values) => {
                let missing = values.iter().filter(|v| v.is_none()).count();
                let issues = if missing > 0 {
                    vec![format!("{label} has {missing} missing value(s)")]
                } else {
                    Vec::new()
                };
                (values.len(), issues)
            }
            Err(e) => (0, vec![format!("Failed to load {label}: {e}")]),
        }
    }
}

/// Z-score outliers of consecutive fractional price changes.
fn outliers(instrument: &str, prices: &[f64], threshold: f64) -> Option<OutlierSummary> {
    if prices.len() < 3 {
        return None;
    }
    let changes: Vec<f64> = prices.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
    let n = changes.len() as f64;
    let mean = changes.iter().sum::<f64>() / n;
    let var = changes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    if std == 0.0 || !std.is_finite() {
        return None;
    }

    let z: Vec<f64> = changes.iter().map(|c| ((c - mean) / std).abs()).collect();
    let count = z.iter().filter(|z| **z > threshold).count();
    if count == 0 {
        return None;
    }
    Some(OutlierSummary {
        instrument: instrument.to_string(),
        outliers: count,
        max_z: z.iter().copied().fold(0.0, f64::max),
    })
}

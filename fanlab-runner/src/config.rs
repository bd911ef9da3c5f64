//! Pipeline configuration, loaded from TOML.
//!
//! Every section is optional; missing keys take their defaults. The output
//! environment is an explicit value, never guessed from the filesystem.
//!
//! ```toml
//! [data]
//! root = "data"
//!
//! [output]
//! environment = "local"
//!
//! [dispatch]
//! num_instruments = 5
//! max_concurrency = 4
//!
//! [aggregate]
//! quality = "recompute"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use fanlab_core::data::{DatasetLayout, RetryPolicy, ValidationConfig};
use fanlab_core::signal::SignalParams;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where partition results are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunEnvironment {
    #[default]
    Local,
    Cluster,
}

impl RunEnvironment {
    pub fn as_str(self) -> &'static str {
        match self {
            RunEnvironment::Local => "local",
            RunEnvironment::Cluster => "cluster",
        }
    }
}

impl fmt::Display for RunEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunEnvironment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(RunEnvironment::Local),
            "cluster" => Ok(RunEnvironment::Cluster),
            other => Err(ConfigError::Invalid(format!(
                "unknown environment '{other}' (expected local or cluster)"
            ))),
        }
    }
}

/// How the aggregator treats trade-quality labels persisted by partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityReconciliation {
    /// Relabel every record from the merged series.
    #[default]
    Recompute,
    /// Keep evaluable partition labels; relabel only unevaluable ones.
    ReusePartition,
}

impl FromStr for QualityReconciliation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recompute" => Ok(QualityReconciliation::Recompute),
            "reuse_partition" | "reuse-partition" => Ok(QualityReconciliation::ReusePartition),
            other => Err(ConfigError::Invalid(format!(
                "unknown quality mode '{other}' (expected recompute or reuse_partition)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub root: PathBuf,
    pub holdings: String,
    pub volatility: String,
    pub market: String,
    pub timestamp_column: String,
    pub market_column: String,
    pub volatility_column: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        let layout = DatasetLayout::default();
        Self {
            root: PathBuf::from("data"),
            holdings: layout.holdings,
            volatility: layout.volatility,
            market: layout.market,
            timestamp_column: layout.timestamp_column,
            market_column: layout.market_column,
            volatility_column: layout.volatility_column,
        }
    }
}

impl DataConfig {
    pub fn layout(&self) -> DatasetLayout {
        DatasetLayout {
            holdings: self.holdings.clone(),
            volatility: self.volatility.clone(),
            market: self.market.clone(),
            timestamp_column: self.timestamp_column.clone(),
            market_column: self.market_column.clone(),
            volatility_column: self.volatility_column.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub environment: RunEnvironment,
    pub local_dir: PathBuf,
    pub cluster_dir: PathBuf,
    /// Markdown summaries and exports.
    pub reports_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            environment: RunEnvironment::Local,
            local_dir: PathBuf::from("output/test_results"),
            cluster_dir: PathBuf::from("/mnt/fanlab/test_results"),
            reports_dir: PathBuf::from("output/reports"),
        }
    }
}

impl OutputConfig {
    /// Result directory of the configured environment.
    pub fn result_dir(&self) -> &Path {
        match self.environment {
            RunEnvironment::Local => &self.local_dir,
            RunEnvironment::Cluster => &self.cluster_dir,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Cap on instruments per run; absent or 0 means all.
    pub num_instruments: Option<usize>,
    pub max_concurrency: usize,
    pub fault_injection: bool,
    /// Symbol index that fails deterministically when fault injection is on.
    pub fault_sentinel: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            num_instruments: None,
            max_concurrency: 4,
            fault_injection: true,
            fault_sentinel: 7,
        }
    }
}

impl DispatchConfig {
    pub fn sentinel(&self) -> Option<usize> {
        self.fault_injection.then_some(self.fault_sentinel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    pub quality: QualityReconciliation,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub output: OutputConfig,
    pub dispatch: DispatchConfig,
    pub retry: RetryConfig,
    pub signal: SignalParams,
    pub validation: ValidationConfig,
    pub aggregate: AggregateConfig,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        for (key, value) in [
            ("data.holdings", &self.data.holdings),
            ("data.volatility", &self.data.volatility),
            ("data.market", &self.data.market),
            ("data.timestamp_column", &self.data.timestamp_column),
            ("data.market_column", &self.data.market_column),
            ("data.volatility_column", &self.data.volatility_column),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{key} must not be empty")));
            }
        }
        if self.data.timestamp_column == self.data.market_column {
            return invalid("data.timestamp_column and data.market_column must differ");
        }
        if self.dispatch.max_concurrency == 0 {
            return invalid("dispatch.max_concurrency must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if !positive(self.signal.baseline_volatility) {
            return invalid("signal.baseline_volatility must be positive");
        }
        if self.signal.threshold_pct.is_nan() || self.signal.threshold_pct < 0.0 {
            return invalid("signal.threshold_pct must be non-negative");
        }
        if !positive(self.signal.beta_clip) {
            return invalid("signal.beta_clip must be positive");
        }
        if !positive(self.validation.outlier_z) {
            return invalid("validation.outlier_z must be positive");
        }
        Ok(())
    }

    pub fn result_dir(&self) -> &Path {
        self.output.result_dir()
    }
}

/// False for NaN.
fn positive(x: f64) -> bool {
    x.partial_cmp(&0.0) == Some(std::cmp::Ordering::Greater)
}

//! Instrument identifier: the unit of partitioning.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A tradable instrument identifier (e.g. `AAPL`, `BRK-B`).
///
/// Immutable once chosen for a run. Ordering is lexical, which is what the
/// aggregator uses when it merges partitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(String);

impl Instrument {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Execution-engine tag used to trace every submission for this instrument.
    pub fn tag(&self) -> String {
        format!("instrument:{}", self.0)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Instrument {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Instrument {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Instrument {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

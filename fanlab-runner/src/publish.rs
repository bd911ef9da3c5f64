//! Summary publishing: human-readable markdown keyed by name.
//!
//! Publishing never decides the outcome of a run. Callers go through
//! [`publish_or_warn`], which logs a failure and carries on.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid summary key '{0}'")]
    InvalidKey(String),

    #[error("publish '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

/// Destination for keyed markdown summaries.
pub trait SummaryPublisher: Send + Sync {
    fn publish(&self, key: &str, markdown: &str) -> Result<(), PublishError>;
}

/// Publish, logging instead of failing.
pub fn publish_or_warn(publisher: &dyn SummaryPublisher, key: &str, markdown: &str) {
    if let Err(e) = publisher.publish(key, markdown) {
        warn!(key, error = %e, "summary not published");
    }
}

fn check_key(key: &str) -> Result<(), PublishError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !key.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(PublishError::InvalidKey(key.to_string()))
    }
}

/// Writes `{dir}/{key}.md`, replacing any earlier summary with the same key.
#[derive(Debug, Clone)]
pub struct MarkdownPublisher {
    dir: PathBuf,
}

impl MarkdownPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.md"))
    }
}

impl SummaryPublisher for MarkdownPublisher {
    fn publish(&self, key: &str, markdown: &str) -> Result<(), PublishError> {
        check_key(key)?;
        let io_err = |source| PublishError::Io {
            key: key.to_string(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let path = self.path(key);
        let tmp = path.with_extension("md.tmp");
        fs::write(&tmp, markdown).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;
        debug!(key, path = %path.display(), "summary written");
        Ok(())
    }
}

/// Emits summaries as log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

impl SummaryPublisher for TracingPublisher {
    fn publish(&self, key: &str, markdown: &str) -> Result<(), PublishError> {
        check_key(key)?;
        info!(key, lines = markdown.lines().count(), "summary published");
        debug!(key, "\n{markdown}");
        Ok(())
    }
}

/// Keeps summaries in memory, latest per key.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    entries: Mutex<Vec<(String, String)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Keys in first-publication order.
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = Vec::new();
        for (k, _) in entries.iter() {
            if !keys.contains(k) {
                keys.push(k.clone());
            }
        }
        keys
    }
}

impl SummaryPublisher for MemoryPublisher {
    fn publish(&self, key: &str, markdown: &str) -> Result<(), PublishError> {
        check_key(key)?;
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((key.to_string(), markdown.to_string()));
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

impl SummaryPublisher for NullPublisher {
    fn publish(&self, _key: &str, _markdown: &str) -> Result<(), PublishError> {
        Ok(())
    }
}

//! Named columnar dataset storage.
//!
//! `DatasetStore` is the seam to whatever holds the pipeline's inputs and
//! partition outputs. `ParquetStore` is the local implementation:
//!
//! Layout: `{root}/{name}.parquet`
//!
//! - Atomic writes (write to `.parquet.tmp`, rename into place)
//! - Overwrite is idempotent; the last complete write wins
//! - Partially written temp files are never listed

use polars::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const EXTENSION: &str = "parquet";

/// Errors from a dataset store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("dataset '{name}' not found at {location}")]
    NotFound { name: String, location: String },

    #[error("I/O error on dataset '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("dataset '{name}' is not a readable columnar file: {reason}")]
    Format { name: String, reason: String },
}

impl StoreError {
    /// I/O hiccups are worth retrying; a missing or malformed file is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io { .. })
    }
}

/// Read/write access to named columnar datasets.
pub trait DatasetStore: Send + Sync {
    /// Read a whole dataset.
    fn read(&self, name: &str) -> Result<DataFrame, StoreError>;

    /// Write (or overwrite) a dataset. Returns its location.
    fn write(&self, name: &str, frame: &mut DataFrame) -> Result<String, StoreError>;

    /// Names of all complete datasets, sorted.
    fn list(&self) -> Result<Vec<String>, StoreError>;

    /// Human-readable location of a dataset, whether or not it exists.
    fn locate(&self, name: &str) -> String;

    fn exists(&self, name: &str) -> bool;
}

/// Parquet files in a local directory.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    root: PathBuf,
}

impl ParquetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{name}.parquet`
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{EXTENSION}"))
    }
}

/// I/O failures surfacing through the decoder stay retryable; anything
/// else means the file itself is bad.
fn read_error(name: &str, err: PolarsError) -> StoreError {
    match err {
        PolarsError::IO { error, .. } => StoreError::Io {
            name: name.to_string(),
            source: io::Error::new(error.kind(), error.to_string()),
        },
        other => StoreError::Format {
            name: name.to_string(),
            reason: other.to_string(),
        },
    }
}

impl DatasetStore for ParquetStore {
    fn read(&self, name: &str) -> Result<DataFrame, StoreError> {
        let path = self.path(name);
        let file = fs::File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound {
                name: name.to_string(),
                location: path.display().to_string(),
            },
            _ => StoreError::Io {
                name: name.to_string(),
                source: e,
            },
        })?;
        ParquetReader::new(file)
            .finish()
            .map_err(|e| read_error(name, e))
    }

    fn write(&self, name: &str, frame: &mut DataFrame) -> Result<String, StoreError> {
        let io_err = |source: io::Error| StoreError::Io {
            name: name.to_string(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(io_err)?;

        let path = self.path(name);
        let tmp_path = path.with_extension(format!("{EXTENSION}.tmp"));

        let file = fs::File::create(&tmp_path).map_err(io_err)?;
        if let Err(e) = ParquetWriter::new(file).finish(frame) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::Format {
                name: name.to_string(),
                reason: format!("write parquet: {e}"),
            });
        }

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_err(e)
        })?;

        Ok(path.display().to_string())
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root).map_err(|e| StoreError::Io {
            name: self.root.display().to_string(),
            source: e,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io {
                name: self.root.display().to_string(),
                source: e,
            })?;
            let path = entry.path();
            // Skips `.parquet.tmp` and anything else that is not a finished file
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn locate(&self, name: &str) -> String {
        self.path(name).display().to_string()
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }
}

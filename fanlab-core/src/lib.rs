//! fanlab core: domain types, market data access and the signal engine.
//!
//! - Domain types (instruments, observations, signal records, labels)
//! - Dataset store seam with a local parquet implementation
//! - Market context store (instrument prices left-joined with volatility and market index)
//! - Partitioner and pre-flight validator
//! - Volatility-adjusted signal engine with lookahead trade-quality labelling
//! - Synthetic data generation and live market-data ingestion

pub mod data;
pub mod domain;
pub mod fingerprint;
pub mod signal;

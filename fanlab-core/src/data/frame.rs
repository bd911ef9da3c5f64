//! Column extraction helpers over polars frames.
//!
//! Everything is pulled into plain `Vec<Option<_>>` so the rest of the crate
//! works on ordinary Rust values and never on polars types.

use polars::prelude::*;
use thiserror::Error;

const MILLIS_PER_DAY: i64 = 86_400_000;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' has unsupported type {dtype}")]
    UnsupportedType { column: String, dtype: String },

    #[error("polars: {0}")]
    Polars(#[from] PolarsError),
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, FrameError> {
    df.column(name)
        .map_err(|_| FrameError::MissingColumn(name.to_string()))
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
    )
}

/// Timestamps as epoch milliseconds.
///
/// Accepts any `Datetime` unit or time zone (physical values are UTC),
/// `Date`, or raw `Int64` milliseconds.
pub fn timestamp_millis(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, FrameError> {
    let col = column(df, name)?;
    // (divisor, multiplier) from the physical value to milliseconds
    let (div, mul) = match col.dtype() {
        DataType::Datetime(TimeUnit::Nanoseconds, _) => (1_000_000, 1),
        DataType::Datetime(TimeUnit::Microseconds, _) => (1_000, 1),
        DataType::Datetime(TimeUnit::Milliseconds, _) | DataType::Int64 => (1, 1),
        DataType::Date => (1, MILLIS_PER_DAY),
        other => {
            return Err(FrameError::UnsupportedType {
                column: name.to_string(),
                dtype: other.to_string(),
            })
        }
    };
    let physical = col.cast(&DataType::Int64)?;
    Ok(physical
        .i64()?
        .into_iter()
        .map(|v| v.map(|v| v.div_euclid(div) * mul))
        .collect())
}

/// Numeric column as `f64`, nulls preserved.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, FrameError> {
    let col = column(df, name)?;
    if !is_numeric(col.dtype()) {
        return Err(FrameError::UnsupportedType {
            column: name.to_string(),
            dtype: col.dtype().to_string(),
        });
    }
    let cast = col.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

/// String column, nulls preserved.
pub fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, FrameError> {
    let col = column(df, name)?;
    let ca = col.str().map_err(|_| FrameError::UnsupportedType {
        column: name.to_string(),
        dtype: col.dtype().to_string(),
    })?;
    Ok(ca.into_iter().map(|v| v.map(str::to_string)).collect())
}

/// Build a millisecond `Datetime` column.
pub fn timestamp_column(name: &str, millis: Vec<i64>) -> Result<Column, FrameError> {
    Ok(Column::new(name.into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?)
}

/// Column names of a frame, in stored order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|n| n.to_string())
        .collect()
}

//! Column helpers over polars frames.

use anyhow::{Context, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

use trip_core::TripError;

pub fn read_csv(path: &Path) -> Result<DataFrame> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    CsvReader::new(file)
        .has_header(true)
        .finish()
        .with_context(|| format!("reading CSV file {}", path.display()))
}

pub fn has_column(df: &DataFrame, column: &str) -> bool {
    df.get_column_names().iter().any(|c| *c == column)
}

fn required<'a>(df: &'a DataFrame, column: &str, table: &str) -> Result<&'a Series> {
    df.column(column).map_err(|_| {
        TripError::Load(format!("{table} is missing required column '{column}'")).into()
    })
}

/// Column as strings; numeric ids are rendered with their display form.
pub fn column_utf8(df: &DataFrame, column: &str, table: &str) -> Result<Vec<Option<String>>> {
    let series = required(df, column, table)?
        .cast(&DataType::Utf8)
        .with_context(|| format!("casting '{column}' to utf8"))?;
    let chunked = series
        .utf8()
        .with_context(|| format!("column '{column}' must be utf8"))?;
    Ok(chunked
        .into_iter()
        .map(|opt| opt.map(|value| value.to_string()))
        .collect())
}

pub fn column_f64(df: &DataFrame, column: &str, table: &str) -> Result<Vec<Option<f64>>> {
    let series = required(df, column, table)?
        .cast(&DataType::Float64)
        .with_context(|| format!("casting '{column}' to float"))?;
    let chunked = series
        .f64()
        .with_context(|| format!("column '{column}' must be float"))?;
    Ok(chunked
        .into_iter()
        .map(|opt| opt.filter(|v| !v.is_nan()))
        .collect())
}

/// Like [`column_f64`], but an absent column reads as all-null.
pub fn optional_f64(df: &DataFrame, column: &str, table: &str) -> Result<Vec<Option<f64>>> {
    if has_column(df, column) {
        column_f64(df, column, table)
    } else {
        Ok(vec![None; df.height()])
    }
}

pub fn optional_utf8(df: &DataFrame, column: &str, table: &str) -> Result<Vec<Option<String>>> {
    if has_column(df, column) {
        column_utf8(df, column, table)
    } else {
        Ok(vec![None; df.height()])
    }
}

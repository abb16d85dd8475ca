//! Table loading and saving utilities

use crate::error::{PhishnetError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// CSV loader for pipeline tables
#[derive(Debug, Default, Clone, Copy)]
pub struct DataLoader;

impl DataLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a CSV file with a header row; column types are inferred from every row
    pub fn load_csv(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path).map_err(|e| {
            PhishnetError::IoError(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;

        let reader = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(None)
            .into_reader_with_file_handle(file);

        reader
            .finish()
            .map_err(|e| PhishnetError::DataError(format!("{}: {}", path.display(), e)))
    }
}

/// Writes tables to disk
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV with a header, creating parent directories
    pub fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .map_err(|e| PhishnetError::DataError(format!("{}: {}", path.display(), e)))
    }
}

/// Column values as f64, with nulls mapped to NaN.
///
/// Cells that do not parse as numbers are a schema error, never a missing value.
pub fn column_to_vec(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| PhishnetError::ColumnNotFound(name.to_string()))?;
    let as_f64 = column.strict_cast(&DataType::Float64).map_err(|e| {
        PhishnetError::SchemaError(format!(
            "column {} ({}) holds non-numeric values: {}",
            name,
            column.dtype(),
            e
        ))
    })?;
    let values = as_f64
        .f64()
        .map_err(|e| PhishnetError::DataError(e.to_string()))?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}

/// Single column as an `Array1`, nulls included as NaN
pub fn column_to_array1(df: &DataFrame, name: &str) -> Result<Array1<f64>> {
    Ok(Array1::from_vec(column_to_vec(df, name)?))
}

/// Selected columns as a row-major `Array2`, nulls as NaN
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|name| column_to_vec(df, name))
        .collect::<Result<Vec<_>>>()?;

    Ok(Array2::from_shape_fn((n_rows, col_names.len()), |(r, c)| {
        col_data[c][r]
    }))
}

/// Column names in table order
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

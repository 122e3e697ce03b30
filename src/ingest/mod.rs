//! CSV ingestion
//!
//! Schema-directed loading: the caller names the columns to keep and their
//! types; other CSV columns are ignored. Parse failures surface as import
//! errors naming the offending record.

use std::path::Path;

use crate::table::{ColumnTable, DataType};
use crate::{DiffError, Result};

/// Load a CSV file into a columnar table using the given (name, type) schema
pub fn load_csv(path: impl AsRef<Path>, schema: &[(String, DataType)]) -> Result<ColumnTable> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| DiffError::ImportError(format!("{}: {}", path.display(), e)))?;

    let headers = reader
        .headers()
        .map_err(|e| DiffError::ImportError(e.to_string()))?
        .clone();

    // resolve each schema column to its CSV position
    let mut positions = Vec::with_capacity(schema.len());
    for (name, _) in schema {
        let pos = headers
            .iter()
            .position(|h| h == name.as_str())
            .ok_or_else(|| DiffError::ImportError(format!("column {} not in header", name)))?;
        positions.push(pos);
    }

    let mut double_cols: Vec<Vec<f64>> = vec![Vec::new(); schema.len()];
    let mut string_cols: Vec<Vec<String>> = vec![Vec::new(); schema.len()];

    for (row_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| DiffError::ImportError(e.to_string()))?;
        for (col_idx, ((name, dtype), &pos)) in schema.iter().zip(positions.iter()).enumerate() {
            let raw = record.get(pos).unwrap_or("");
            match dtype {
                DataType::Double => {
                    let value = raw.parse::<f64>().map_err(|_| {
                        DiffError::ImportError(format!(
                            "row {}: {} is not a double for column {}",
                            row_idx + 1,
                            raw,
                            name
                        ))
                    })?;
                    double_cols[col_idx].push(value);
                }
                DataType::String => string_cols[col_idx].push(raw.to_string()),
            }
        }
    }

    let mut table = ColumnTable::new();
    for (col_idx, (name, dtype)) in schema.iter().enumerate() {
        match dtype {
            DataType::Double => {
                table.add_double_column(name, std::mem::take(&mut double_cols[col_idx]))?
            }
            DataType::String => {
                table.add_string_column(name, std::mem::take(&mut string_cols[col_idx]))?
            }
        }
    }
    Ok(table)
}

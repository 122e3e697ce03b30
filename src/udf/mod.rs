//! Scalar user-defined functions
//!
//! A UDF takes one Double column and produces a Double column of the same
//! length. Functions are resolved by name from a process-wide registry;
//! qualified names (`a.b.percentile`) resolve by their trailing segment.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::table::ColumnTable;
use crate::{DiffError, Result};

type UdfImpl = fn(&[f64]) -> Vec<f64>;

static REGISTRY: Lazy<HashMap<&'static str, UdfImpl>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, UdfImpl> = HashMap::new();
    m.insert("percentile", percentile);
    m.insert("normalize", normalize);
    m
});

/// Trailing segment of a possibly qualified function name
pub fn base_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// A UDF bound to its argument column
#[derive(Debug, Clone)]
pub struct BoundUdf {
    name: String,
    column: String,
    func: UdfImpl,
}

impl BoundUdf {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate against a table, producing one value per row
    pub fn apply(&self, table: &ColumnTable) -> Result<Vec<f64>> {
        let values = table.double_column_by_name(&self.column)?;
        Ok((self.func)(values))
    }
}

/// Resolve a function by name and bind it to its argument column
pub fn get_function(name: &str, column: &str) -> Result<BoundUdf> {
    let base = base_name(name);
    let func = REGISTRY
        .get(base)
        .copied()
        .ok_or_else(|| DiffError::UnknownFunction(base.to_string()))?;
    Ok(BoundUdf {
        name: base.to_string(),
        column: column.to_string(),
        func,
    })
}

/// Percentile rank of each value, 0–100
fn percentile(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    values
        .iter()
        .map(|&x| {
            let rank = sorted.partition_point(|&v| v <= x);
            100.0 * rank as f64 / n as f64
        })
        .collect()
}

/// Scale each value by the column's maximum absolute value
fn normalize(values: &[f64]) -> Vec<f64> {
    let max_abs = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if max_abs == 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|&x| x / max_abs).collect()
}

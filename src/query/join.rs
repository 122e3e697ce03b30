//! Inner equijoin on a single key column
//!
//! The smaller input becomes the inner loop. Non-join columns whose names
//! appear in both schemas are qualified as `<table>.<col>` in the output;
//! the join column appears exactly once.

use crate::ast::{Join, JoinCriteria, JoinType};
use crate::query::{relation_name, QueryEngine};
use crate::table::{ColumnData, ColumnTable, Schema};
use crate::{DiffError, Result};

impl QueryEngine {
    pub(crate) fn evaluate_join(&mut self, join: &Join) -> Result<ColumnTable> {
        let left = self.table_for_relation(&join.left)?;
        let right = self.table_for_relation(&join.right)?;

        let left_smaller = left.num_rows() < right.num_rows();
        let (smaller, bigger) = if left_smaller { (left, right) } else { (right, left) };
        let (smaller_name, bigger_name) = if left_smaller {
            (relation_name(&join.left)?, relation_name(&join.right)?)
        } else {
            (relation_name(&join.right)?, relation_name(&join.left)?)
        };

        let criteria = join.criteria.as_ref().ok_or_else(|| {
            DiffError::InvalidJoin("no clause (e.g., ON, USING) specified in JOIN".to_string())
        })?;
        let join_col = join_column(criteria, &bigger.schema(), &smaller.schema())?;

        match join.join_type {
            JoinType::Inner => {
                inner_join(&bigger, &bigger_name, &smaller, &smaller_name, &join_col)
            }
            other => Err(DiffError::UnsupportedOperator(format!("join type {}", other))),
        }
    }
}

/// Resolve the single join column from the criteria and the two schemas
pub(crate) fn join_column(
    criteria: &JoinCriteria,
    first: &Schema,
    second: &Schema,
) -> Result<String> {
    match criteria {
        JoinCriteria::On(expr) => match expr {
            crate::ast::Expression::Identifier(name) => Ok(name.clone()),
            _ => Err(DiffError::InvalidJoin(
                "only one column allowed with JOIN ON".to_string(),
            )),
        },
        JoinCriteria::Using(columns) => {
            if columns.len() != 1 {
                return Err(DiffError::InvalidJoin(
                    "only one column allowed with JOIN USING".to_string(),
                ));
            }
            Ok(columns[0].clone())
        }
        JoinCriteria::Natural => {
            let mut shared: Vec<String> = first
                .column_names()
                .into_iter()
                .filter(|n| second.has_column(n))
                .collect();
            if shared.len() != 1 {
                return Err(DiffError::InvalidJoin(
                    "exactly one column allowed with NATURAL JOIN".to_string(),
                ));
            }
            Ok(shared.remove(0))
        }
    }
}

fn inner_join(
    bigger: &ColumnTable,
    bigger_name: &str,
    smaller: &ColumnTable,
    smaller_name: &str,
    join_col: &str,
) -> Result<ColumnTable> {
    let bigger_schema = bigger.schema();
    let smaller_schema = smaller.schema();
    let bigger_idx = bigger_schema
        .get_index(join_col)
        .ok_or_else(|| DiffError::ColumnNotFound(join_col.to_string()))?;
    let smaller_idx = smaller_schema
        .get_index(join_col)
        .ok_or_else(|| DiffError::ColumnNotFound(join_col.to_string()))?;

    let bigger_type = bigger.columns()[bigger_idx].data.data_type();
    let smaller_type = smaller.columns()[smaller_idx].data.data_type();
    if bigger_type != smaller_type {
        return Err(DiffError::TypeMismatch(format!(
            "column {} has type {} in one table but type {} in the other",
            join_col, bigger_type, smaller_type
        )));
    }

    // matching (bigger row, smaller row) pairs; bigger drives the outer loop
    let mut bigger_rows: Vec<usize> = Vec::new();
    let mut smaller_rows: Vec<usize> = Vec::new();
    match &bigger.columns()[bigger_idx].data {
        ColumnData::Double(big_keys) => {
            let small_keys = smaller.double_column(smaller_idx)?;
            for (i, bk) in big_keys.iter().enumerate() {
                for (j, sk) in small_keys.iter().enumerate() {
                    if bk == sk {
                        bigger_rows.push(i);
                        smaller_rows.push(j);
                    }
                }
            }
        }
        ColumnData::String(big_keys) => {
            let small_keys = smaller.string_column(smaller_idx)?;
            for (i, bk) in big_keys.iter().enumerate() {
                for (j, sk) in small_keys.iter().enumerate() {
                    if bk == sk {
                        bigger_rows.push(i);
                        smaller_rows.push(j);
                    }
                }
            }
        }
    }

    let mut result = ColumnTable::new();
    for col in bigger.columns() {
        let out_name = if smaller_schema.has_column(&col.name) && col.name != join_col {
            format!("{}.{}", bigger_name, col.name)
        } else {
            col.name.clone()
        };
        add_gathered(&mut result, &out_name, &col.data, &bigger_rows)?;
    }
    for col in smaller.columns() {
        if col.name == join_col {
            continue;
        }
        let out_name = if bigger_schema.has_column(&col.name) {
            format!("{}.{}", smaller_name, col.name)
        } else {
            col.name.clone()
        };
        add_gathered(&mut result, &out_name, &col.data, &smaller_rows)?;
    }
    Ok(result)
}

fn add_gathered(
    result: &mut ColumnTable,
    name: &str,
    data: &ColumnData,
    rows: &[usize],
) -> Result<()> {
    match data {
        ColumnData::Double(v) => {
            result.add_double_column(name, rows.iter().map(|&i| v[i]).collect())
        }
        ColumnData::String(v) => {
            result.add_string_column(name, rows.iter().map(|&i| v[i].clone()).collect())
        }
    }
}

//! Predicate mask evaluation
//!
//! Compiles a boolean WHERE-expression tree into a row bitmask over a
//! table. Accepted leaves are comparisons between a column (or UDF call)
//! and a literal, in either argument order; the column value is always the
//! left operand of the comparison. Constant/constant comparisons reduce to
//! literal equality. AND/OR/NOT combine masks word-wise.

use crate::ast::{CompareOp, Expression, LogicalOp};
use crate::table::{BitVec, ColumnTable, DataType};
use crate::udf;
use crate::{DiffError, Result};

/// Row mask for a boolean expression over a table
pub(crate) fn mask_for_expression(table: &ColumnTable, expr: &Expression) -> Result<BitVec> {
    match expr {
        Expression::Not(inner) => {
            let mut mask = mask_for_expression(table, inner)?;
            mask.flip_all();
            Ok(mask)
        }
        Expression::LogicalBinary { op, left, right } => {
            let mut left_mask = mask_for_expression(table, left)?;
            let right_mask = mask_for_expression(table, right)?;
            match op {
                LogicalOp::And => left_mask.and_with(&right_mask),
                LogicalOp::Or => left_mask.or_with(&right_mask),
            }
            Ok(left_mask)
        }
        Expression::Comparison { op, left, right } => {
            match (left.as_ref(), right.as_ref()) {
                (l, r) if l.is_literal() && r.is_literal() => Ok(literal_mask(table, l, r)),
                (l, Expression::Identifier(name)) if l.is_literal() => {
                    mask_for_column_predicate(table, l, name, *op)
                }
                (Expression::Identifier(name), r) if r.is_literal() => {
                    mask_for_column_predicate(table, r, name, *op)
                }
                (Expression::FunctionCall { name, args }, r) if r.is_literal() => {
                    mask_for_udf_predicate(table, name, args, r, *op)
                }
                (l, Expression::FunctionCall { name, args }) if l.is_literal() => {
                    mask_for_udf_predicate(table, name, args, l, *op)
                }
                _ => Err(DiffError::UnsupportedQuery(
                    "boolean expression not supported".to_string(),
                )),
            }
        }
        _ => Err(DiffError::UnsupportedQuery(
            "boolean expression not supported".to_string(),
        )),
    }
}

// Constant predicate, evaluated once for the whole table. Only literal
// equality is tested; the comparison operator is not consulted for
// constant/constant pairs (DESIGN.md decision 14).
fn literal_mask(table: &ColumnTable, left: &Expression, right: &Expression) -> BitVec {
    if left == right {
        BitVec::ones(table.num_rows())
    } else {
        BitVec::zeros(table.num_rows())
    }
}

// Column-vs-literal comparison; the column is the left operand
fn mask_for_column_predicate(
    table: &ColumnTable,
    literal: &Expression,
    column: &str,
    op: CompareOp,
) -> Result<BitVec> {
    let col_index = table
        .column_index(column)
        .ok_or_else(|| DiffError::ColumnNotFound(column.to_string()))?;
    let col_type = table.columns()[col_index].data.data_type();

    match col_type {
        DataType::Double => match literal {
            Expression::DoubleLiteral(y) => {
                let y = *y;
                table.mask_for_double_filter(col_index, |x| compare_doubles(op, x, y))
            }
            _ => Err(DiffError::TypeMismatch(format!(
                "column {} has type DOUBLE, but {} is not a double literal",
                column, literal
            ))),
        },
        DataType::String => match literal {
            Expression::StringLiteral(y) => {
                table.mask_for_string_filter(col_index, |x| compare_strings(op, x, Some(y.as_str())))
            }
            Expression::NullLiteral => {
                table.mask_for_string_filter(col_index, |x| compare_strings(op, x, None))
            }
            _ => Err(DiffError::TypeMismatch(format!(
                "column {} has type STRING, but {} is not a string literal",
                column, literal
            ))),
        },
    }
}

// UDF-vs-literal comparison; the UDF output is the left operand
fn mask_for_udf_predicate(
    table: &ColumnTable,
    func_name: &str,
    args: &[Expression],
    literal: &Expression,
    op: CompareOp,
) -> Result<BitVec> {
    let y = match literal {
        Expression::DoubleLiteral(y) => *y,
        _ => {
            return Err(DiffError::TypeMismatch(format!(
                "{} is not a double literal",
                literal
            )))
        }
    };
    let arg = args.first().ok_or_else(|| {
        DiffError::UnsupportedQuery(format!("function {} called without arguments", func_name))
    })?;
    let bound = udf::get_function(func_name, &arg.to_string())?;
    let values = bound.apply(table)?;
    let mut mask = BitVec::with_capacity(values.len());
    for &x in &values {
        mask.push(compare_doubles(op, x, y));
    }
    Ok(mask)
}

#[inline]
fn compare_doubles(op: CompareOp, x: f64, y: f64) -> bool {
    match op {
        CompareOp::Equal => x == y,
        // both sides are non-null here, so IS DISTINCT FROM is plain inequality
        CompareOp::NotEqual | CompareOp::IsDistinctFrom => x != y,
        CompareOp::LessThan => x < y,
        CompareOp::LessEqual => x <= y,
        CompareOp::GreaterThan => x > y,
        CompareOp::GreaterEqual => x >= y,
    }
}

#[inline]
fn compare_strings(op: CompareOp, x: &str, y: Option<&str>) -> bool {
    match y {
        Some(y) => match op {
            CompareOp::Equal => x == y,
            CompareOp::NotEqual | CompareOp::IsDistinctFrom => x != y,
            CompareOp::LessThan => x < y,
            CompareOp::LessEqual => x <= y,
            CompareOp::GreaterThan => x > y,
            CompareOp::GreaterEqual => x >= y,
        },
        // column values are never null: only inequality holds against NULL
        None => matches!(op, CompareOp::NotEqual | CompareOp::IsDistinctFrom),
    }
}

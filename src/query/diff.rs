//! DIFF query evaluation
//!
//! Builds the tagged "table to explain" from either two subqueries or a
//! single SPLIT…WHERE relation, runs the outlier summarizer over it, and
//! post-processes the result. Two subqueries that are natural PK-FK joins
//! sharing the same dimension table are routed to the fused DIFF-JOIN
//! path instead.

use ahash::AHashSet;
use log::info;

use crate::ast::{DiffArgs, DiffQuerySpec, Join, QueryBody, Relation};
use crate::explain::{OutlierSummarizer, GLOBAL_RATIO};
use crate::query::{filter, QueryEngine};
use crate::table::{ColumnTable, DataType};
use crate::{DiffError, Result};

/// Binary column tagging each row as outlier (1.0) or inlier (0.0)
pub(crate) const OUTLIER_COLUMN: &str = "outlier_col";

const SAMPLE_ROWS: usize = 1000;

impl QueryEngine {
    pub(crate) fn execute_diff_query_spec(&mut self, diff: &DiffQuerySpec) -> Result<ColumnTable> {
        let mut explain_cols = diff.attribute_cols.clone();

        let table_to_explain = match &diff.args {
            DiffArgs::Subqueries { first, second } => {
                if let Some((first_join, second_join)) =
                    diff_join_shape(first, second, &explain_cols, &diff.ratio_metric)
                {
                    let result = self.execute_diff_join(
                        &first_join,
                        &second_join,
                        &explain_cols,
                        diff.min_ratio,
                        diff.min_support,
                    )?;
                    return self.evaluate_standard_clauses(
                        result,
                        &diff.select,
                        &diff.where_clause,
                        &diff.order_by,
                        &diff.limit,
                    );
                }
                let outliers = self.execute_query(first)?;
                let inliers = self.execute_query(second)?;
                concat_outliers_and_inliers(outliers, inliers)?
            }
            DiffArgs::Split(split) => {
                let mut table = self.table_for_relation(&split.relation)?;
                let mask = filter::mask_for_expression(&table, &split.where_clause)?;
                let mut outlier_vals = vec![0.0; table.num_rows()];
                for i in mask.iter_ones() {
                    outlier_vals[i] = 1.0;
                }
                table.add_double_column(OUTLIER_COLUMN, outlier_vals)?;
                table
            }
        };

        if explain_cols.len() == 1 && explain_cols[0] == "*" {
            explain_cols = find_explanation_columns(&table_to_explain)?;
            info!(
                "using {} as candidate attributes for explanation",
                explain_cols.join(", ")
            );
        }
        if !table_to_explain.schema().has_columns(&explain_cols) {
            return Err(DiffError::ColumnNotFound(format!(
                "ON {} not present in table",
                explain_cols.join(", ")
            )));
        }

        let mut summarizer = OutlierSummarizer::new();
        summarizer
            .set_ratio_metric(&diff.ratio_metric)
            .set_max_order(diff.max_order)
            .set_min_support(diff.min_support)
            .set_min_ratio_metric(diff.min_ratio)
            .set_outlier_column(OUTLIER_COLUMN)
            .set_attributes(&explain_cols)
            .set_num_threads(self.num_threads());
        // a summarizer failure fails the whole query; partial results are
        // never surfaced
        summarizer.process(&table_to_explain)?;

        let mut result = summarizer.results()?.to_column_table()?;
        result.rename_column("outliers", "outlier_count")?;
        result.rename_column("count", "total_count")?;

        self.evaluate_standard_clauses(
            result,
            &diff.select,
            &diff.where_clause,
            &diff.order_by,
            &diff.limit,
        )
    }
}

/// Fused-path shape check: both subqueries are SELECTs over natural joins
/// that share the right-hand relation with distinct left-hand relations,
/// exactly one named explain column, and the global_ratio metric.
fn diff_join_shape(
    first: &QueryBody,
    second: &QueryBody,
    explain_cols: &[String],
    ratio_metric: &str,
) -> Option<(Join, Join)> {
    if explain_cols.len() != 1 || explain_cols[0] == "*" || ratio_metric != GLOBAL_RATIO {
        return None;
    }
    let (first_spec, second_spec) = match (first, second) {
        (QueryBody::Select(f), QueryBody::Select(s)) => (f, s),
        _ => return None,
    };
    let (first_join, second_join) = match (&first_spec.from, &second_spec.from) {
        (Relation::Join(f), Relation::Join(s)) => (f, s),
        _ => return None,
    };
    let natural_inner = |j: &Join| {
        j.join_type == crate::ast::JoinType::Inner
            && matches!(j.criteria, Some(crate::ast::JoinCriteria::Natural))
    };
    if !natural_inner(first_join) || !natural_inner(second_join) {
        return None;
    }
    if first_join.right == second_join.right && first_join.left != second_join.left {
        Some((first_join.clone(), second_join.clone()))
    } else {
        None
    }
}

// Tag both populations and stack them: outliers first, all 1.0
fn concat_outliers_and_inliers(
    outliers: ColumnTable,
    inliers: ColumnTable,
) -> Result<ColumnTable> {
    let mut outliers = outliers;
    let mut inliers = inliers;
    outliers.add_double_column(OUTLIER_COLUMN, vec![1.0; outliers.num_rows()])?;
    inliers.add_double_column(OUTLIER_COLUMN, vec![0.0; inliers.num_rows()])?;
    ColumnTable::union_all(&[outliers, inliers])
}

/// Auto-select categorical columns for `ON *`: string columns whose
/// distinct-value count within the sampled prefix stays under a quarter of
/// the sample size
pub(crate) fn find_explanation_columns(table: &ColumnTable) -> Result<Vec<String>> {
    let sample_rows = table.num_rows().min(SAMPLE_ROWS);
    let mut columns = Vec::new();
    for name in table.schema().names_by_type(DataType::String) {
        let values = table.string_column_by_name(&name)?;
        let distinct: AHashSet<&str> =
            values[..sample_rows].iter().map(String::as_str).collect();
        if distinct.len() < sample_rows / 4 {
            columns.push(name);
        }
    }
    Ok(columns)
}

//! Query execution
//!
//! The dispatcher inspects the query body and routes to the standard,
//! DIFF, or fused DIFF-JOIN paths, then applies the trailing SQL clauses.
//! Clause order matters: UDFs are materialized before WHERE so filters can
//! reference UDF output, WHERE runs before SELECT so a projected-away
//! column can still filter, ORDER BY runs on the projection, LIMIT last.

pub mod diff;
pub mod diff_join;
pub mod filter;
pub mod join;
#[cfg(test)]
mod tests;

use log::debug;

use crate::ast::{
    Expression, Limit, QueryBody, QuerySpec, Relation, SelectItem, SortItem,
};
use crate::table::{ColumnTable, TableStore};
use crate::{ingest, udf, DataType, DiffError, Result};

/// Facade for executing queries against the in-memory table store
#[derive(Debug)]
pub struct QueryEngine {
    tables: TableStore,
    num_threads: usize,
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryEngine {
    pub fn new() -> Self {
        Self {
            tables: TableStore::new(),
            num_threads: 1,
        }
    }

    /// Engine whose summarizer runs may shard work across threads
    pub fn with_num_threads(num_threads: usize) -> Self {
        Self {
            tables: TableStore::new(),
            num_threads: num_threads.max(1),
        }
    }

    /// Register a pre-built table under a name
    pub fn register_table(&mut self, name: &str, table: ColumnTable) {
        self.tables.insert(name, table);
    }

    /// Load a CSV file and register it; returns a copy of the loaded table
    pub fn import_table_from_csv(
        &mut self,
        path: impl AsRef<std::path::Path>,
        table_name: &str,
        schema: &[(String, DataType)],
    ) -> Result<ColumnTable> {
        let table = ingest::load_csv(path, schema)?;
        self.tables.insert(table_name, table.copy());
        Ok(table)
    }

    /// Execute a query body, dispatching on its variant
    pub fn execute_query(&mut self, query: &QueryBody) -> Result<ColumnTable> {
        match query {
            QueryBody::Select(spec) => {
                debug!("executing query: {:?}", spec);
                self.execute_query_spec(spec)
            }
            QueryBody::Diff(spec) => {
                debug!("executing diff query: {:?}", spec);
                self.execute_diff_query_spec(spec)
            }
        }
    }

    fn execute_query_spec(&mut self, query: &QuerySpec) -> Result<ColumnTable> {
        let table = match &query.from {
            Relation::Join(join) => self.evaluate_join(join)?,
            Relation::Table { name } => self.get_table(name)?,
            _ => {
                return Err(DiffError::UnsupportedQuery(
                    "FROM clause must name a table or a join".to_string(),
                ))
            }
        };
        self.evaluate_standard_clauses(
            table,
            &query.select,
            &query.where_clause,
            &query.order_by,
            &query.limit,
        )
    }

    /// Apply UDF materialization, WHERE, SELECT, ORDER BY, and LIMIT in order
    pub(crate) fn evaluate_standard_clauses(
        &self,
        table: ColumnTable,
        select: &[SelectItem],
        where_clause: &Option<Expression>,
        order_by: &[SortItem],
        limit: &Option<Limit>,
    ) -> Result<ColumnTable> {
        let table = self.evaluate_udfs(table, select)?;
        let table = match where_clause {
            Some(expr) => {
                let mask = filter::mask_for_expression(&table, expr)?;
                table.filter(&mask)
            }
            None => table,
        };
        let table = evaluate_select_clause(table, select)?;
        let table = evaluate_order_by_clause(table, order_by)?;
        Ok(evaluate_limit_clause(table, limit))
    }

    // Materialize every SELECT-clause UDF as a named column. UDFs are
    // evaluated against the input table, so one UDF cannot see another's
    // output column.
    fn evaluate_udfs(&self, input: ColumnTable, select: &[SelectItem]) -> Result<ColumnTable> {
        let mut result = input.copy();
        for item in select {
            if let SelectItem::Column {
                expr: Expression::FunctionCall { name, args },
                ..
            } = item
            {
                let arg = args.first().ok_or_else(|| {
                    DiffError::UnsupportedQuery(format!("function {} called without arguments", name))
                })?;
                let bound = udf::get_function(name, &arg.to_string())?;
                let values = bound.apply(&input)?;
                result.add_double_column(&item.output_name(), values)?;
            }
        }
        Ok(result)
    }

    /// Resolve a relation to a table: subqueries execute, aliases and names
    /// read from the store
    pub(crate) fn table_for_relation(&mut self, relation: &Relation) -> Result<ColumnTable> {
        match relation {
            Relation::Subquery { query } => self.execute_query(query),
            Relation::Aliased { relation, .. } => match relation.as_ref() {
                Relation::Table { name } => self.get_table(name),
                _ => Err(DiffError::UnsupportedQuery(
                    "aliased relation must wrap a table".to_string(),
                )),
            },
            Relation::Table { name } => self.get_table(name),
            Relation::Join(_) => Err(DiffError::UnsupportedQuery(
                "nested join relations are not supported".to_string(),
            )),
        }
    }

    pub(crate) fn num_threads(&self) -> usize {
        self.num_threads
    }

    fn get_table(&self, name: &str) -> Result<ColumnTable> {
        self.tables.get(name)
    }
}

/// Name a relation for join output qualification: table name or alias
pub(crate) fn relation_name(relation: &Relation) -> Result<String> {
    match relation {
        Relation::Table { name } => Ok(name.clone()),
        Relation::Aliased { alias, .. } => Ok(alias.clone()),
        _ => Err(DiffError::UnsupportedQuery(
            "relation has no name for join output".to_string(),
        )),
    }
}

// SELECT *: unchanged; otherwise project the output name of every item
fn evaluate_select_clause(table: ColumnTable, select: &[SelectItem]) -> Result<ColumnTable> {
    if select.iter().any(|item| matches!(item, SelectItem::AllColumns)) {
        return Ok(table);
    }
    let names: Vec<String> = select.iter().map(SelectItem::output_name).collect();
    table.project(&names)
}

fn evaluate_order_by_clause(table: ColumnTable, order_by: &[SortItem]) -> Result<ColumnTable> {
    let item = match order_by.first() {
        Some(item) => item,
        None => return Ok(table),
    };
    // multi-column sort is out of scope, see DESIGN.md item 5
    if order_by.len() > 1 {
        return Err(DiffError::UnsupportedQuery(
            "multi-column ORDER BY".to_string(),
        ));
    }
    let column = match &item.key {
        Expression::Identifier(name) => name.clone(),
        Expression::Dereference { .. } => item.key.to_string(),
        _ => {
            return Err(DiffError::UnsupportedQuery(
                "unsupported expression type in ORDER BY".to_string(),
            ))
        }
    };
    table.order_by(&column, item.ascending)
}

fn evaluate_limit_clause(table: ColumnTable, limit: &Option<Limit>) -> ColumnTable {
    match limit {
        Some(Limit::Count(n)) => table.limit(*n),
        Some(Limit::All) | None => table,
    }
}

//! DiffBase: an in-memory analytical query engine with DIFF/SPLIT operators.
//!
//! Queries arrive as AST values (see [`ast`]); tables are immutable columnar
//! tables of Double and String columns held in a process-local store. The
//! DIFF operator compares an outlier population against an inlier population
//! and reports the attribute subgroups that explain the difference.

pub mod ast;
pub mod encoder;
pub mod explain;
pub mod ingest;
pub mod query;
pub mod table;
pub mod udf;

// Re-export main types
pub use query::QueryEngine;
pub use table::{BitVec, ColumnTable, DataType, Schema, TableStore};

/// Query engine error type
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error("unsupported query shape: {0}")]
    UnsupportedQuery(String),

    #[error("table {0} does not exist")]
    TableNotFound(String),

    #[error("column {0} not found")]
    ColumnNotFound(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid join: {0}")]
    InvalidJoin(String),

    #[error("{0} is not supported")]
    UnsupportedOperator(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("CSV import failed: {0}")]
    ImportError(String),
}

pub type Result<T> = std::result::Result<T, DiffError>;

//! Query tree nodes
//!
//! The SQL text parser lives outside this crate; queries enter as these
//! values. Node families are plain enums matched at dispatch sites.

use std::fmt;

/// Top-level query body
#[derive(Debug, Clone, PartialEq)]
pub enum QueryBody {
    Select(QuerySpec),
    Diff(DiffQuerySpec),
}

/// A standard SELECT query
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub select: Vec<SelectItem>,
    pub from: Relation,
    pub where_clause: Option<Expression>,
    pub order_by: Vec<SortItem>,
    pub limit: Option<Limit>,
}

/// A DIFF query: two tagged populations plus explanation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct DiffQuerySpec {
    pub args: DiffArgs,
    /// ON columns; a single "*" means auto-select
    pub attribute_cols: Vec<String>,
    pub min_ratio: f64,
    pub min_support: f64,
    pub ratio_metric: String,
    pub max_order: usize,
    pub select: Vec<SelectItem>,
    pub where_clause: Option<Expression>,
    pub order_by: Vec<SortItem>,
    pub limit: Option<Limit>,
}

/// The two input shapes of DIFF
#[derive(Debug, Clone, PartialEq)]
pub enum DiffArgs {
    /// DIFF (SELECT …) (SELECT …): explicit outlier and inlier subqueries
    Subqueries {
        first: Box<QueryBody>,
        second: Box<QueryBody>,
    },
    /// SPLIT <relation> WHERE <predicate>: derive the outlier population
    Split(SplitQuery),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitQuery {
    pub relation: Box<Relation>,
    pub where_clause: Expression,
}

/// FROM-clause relations
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    Table { name: String },
    Aliased { relation: Box<Relation>, alias: String },
    Subquery { query: Box<QueryBody> },
    Join(Join),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub left: Box<Relation>,
    pub right: Box<Relation>,
    pub criteria: Option<JoinCriteria>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::Left => write!(f, "LEFT"),
            JoinType::Right => write!(f, "RIGHT"),
            JoinType::Full => write!(f, "FULL"),
            JoinType::Cross => write!(f, "CROSS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinCriteria {
    On(Expression),
    Using(Vec<String>),
    Natural,
}

/// SELECT-clause items
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    AllColumns,
    Column {
        expr: Expression,
        alias: Option<String>,
    },
}

impl SelectItem {
    /// Output column name: the alias when present, else the expression text
    pub fn output_name(&self) -> String {
        match self {
            SelectItem::AllColumns => "*".to_string(),
            SelectItem::Column { expr, alias } => match alias {
                Some(a) => a.clone(),
                None => expr.to_string(),
            },
        }
    }
}

/// Scalar and boolean expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Identifier(String),
    /// Qualified reference, e.g. `t.col`
    Dereference { base: String, field: String },
    DoubleLiteral(f64),
    StringLiteral(String),
    NullLiteral,
    FunctionCall { name: String, args: Vec<Expression> },
    Comparison {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    LogicalBinary {
        op: LogicalOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Not(Box<Expression>),
}

impl Expression {
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expression::DoubleLiteral(_) | Expression::StringLiteral(_) | Expression::NullLiteral
        )
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::Dereference { base, field } => write!(f, "{}.{}", base, field),
            Expression::DoubleLiteral(v) => write!(f, "{}", v),
            Expression::StringLiteral(s) => write!(f, "'{}'", s),
            Expression::NullLiteral => write!(f, "NULL"),
            Expression::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expression::Comparison { op, left, right } => {
                write!(f, "{} {} {}", left, op, right)
            }
            Expression::LogicalBinary { op, left, right } => {
                write!(f, "{} {} {}", left, op, right)
            }
            Expression::Not(inner) => write!(f, "NOT {}", inner),
        }
    }
}

/// Comparison operators accepted in WHERE clauses and join conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    IsDistinctFrom,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Equal => write!(f, "="),
            CompareOp::NotEqual => write!(f, "<>"),
            CompareOp::LessThan => write!(f, "<"),
            CompareOp::LessEqual => write!(f, "<="),
            CompareOp::GreaterThan => write!(f, ">"),
            CompareOp::GreaterEqual => write!(f, ">="),
            CompareOp::IsDistinctFrom => write!(f, "IS DISTINCT FROM"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "AND"),
            LogicalOp::Or => write!(f, "OR"),
        }
    }
}

/// ORDER BY item; only single-column sorts are executed
#[derive(Debug, Clone, PartialEq)]
pub struct SortItem {
    pub key: Expression,
    pub ascending: bool,
}

/// LIMIT clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    All,
    Count(usize),
}

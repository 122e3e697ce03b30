//! End-to-end query scenarios driving the engine through AST values

use crate::ast::*;
use crate::query::diff::find_explanation_columns;
use crate::query::QueryEngine;
use crate::table::{ColumnTable, DataType};
use crate::DiffError;

fn ident(name: &str) -> Expression {
    Expression::Identifier(name.to_string())
}

fn dlit(v: f64) -> Expression {
    Expression::DoubleLiteral(v)
}

fn compare(op: CompareOp, left: Expression, right: Expression) -> Expression {
    Expression::Comparison {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn and(left: Expression, right: Expression) -> Expression {
    Expression::LogicalBinary {
        op: LogicalOp::And,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn column(name: &str) -> SelectItem {
    SelectItem::Column {
        expr: ident(name),
        alias: None,
    }
}

fn table_ref(name: &str) -> Relation {
    Relation::Table {
        name: name.to_string(),
    }
}

fn select_query(
    select: Vec<SelectItem>,
    from: Relation,
    where_clause: Option<Expression>,
) -> QueryBody {
    QueryBody::Select(QuerySpec {
        select,
        from,
        where_clause,
        order_by: Vec::new(),
        limit: None,
    })
}

fn numbers_table() -> ColumnTable {
    let mut t = ColumnTable::new();
    t.add_double_column("x", vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
    t.add_string_column(
        "name",
        vec!["a", "b", "c", "d", "e"].into_iter().map(String::from).collect(),
    )
    .unwrap();
    t
}

fn split_table() -> ColumnTable {
    let mut t = ColumnTable::new();
    t.add_string_column(
        "state",
        vec!["CA", "CA", "CA", "TX", "TX", "FL"]
            .into_iter()
            .map(String::from)
            .collect(),
    )
    .unwrap();
    t.add_double_column("metric", vec![10.0, 12.0, 11.0, 1.0, 2.0, 1.0])
        .unwrap();
    t.add_string_column(
        "city",
        vec!["SF", "SF", "LA", "AUS", "AUS", "MIA"]
            .into_iter()
            .map(String::from)
            .collect(),
    )
    .unwrap();
    t
}

fn diff_spec(args: DiffArgs, attribute_cols: Vec<&str>, min_ratio: f64, min_support: f64) -> QueryBody {
    QueryBody::Diff(DiffQuerySpec {
        args,
        attribute_cols: attribute_cols.into_iter().map(String::from).collect(),
        min_ratio,
        min_support,
        ratio_metric: "global_ratio".to_string(),
        max_order: 1,
        select: vec![SelectItem::AllColumns],
        where_clause: None,
        order_by: Vec::new(),
        limit: None,
    })
}

fn row_for_value(table: &ColumnTable, col: &str, value: &str) -> Option<usize> {
    table
        .string_column_by_name(col)
        .unwrap()
        .iter()
        .position(|v| v == value)
}

// S1: WHERE x > 2 AND x <= 4
#[test]
fn test_predicate_mask_scenario() {
    let mut engine = QueryEngine::new();
    engine.register_table("D", numbers_table());

    let query = select_query(
        vec![column("x")],
        table_ref("D"),
        Some(and(
            compare(CompareOp::GreaterThan, ident("x"), dlit(2.0)),
            compare(CompareOp::LessEqual, ident("x"), dlit(4.0)),
        )),
    );
    let result = engine.execute_query(&query).unwrap();
    assert_eq!(result.double_column_by_name("x").unwrap(), &[3.0, 4.0]);
}

// S2: SPLIT T WHERE metric > 5 ON state
#[test]
fn test_split_diff_scenario() {
    let mut engine = QueryEngine::new();
    engine.register_table("T", split_table());

    let query = diff_spec(
        DiffArgs::Split(SplitQuery {
            relation: Box::new(table_ref("T")),
            where_clause: compare(CompareOp::GreaterThan, ident("metric"), dlit(5.0)),
        }),
        vec!["state"],
        2.0,
        0.4,
    );
    let result = engine.execute_query(&query).unwrap();

    let row = row_for_value(&result, "state", "CA").expect("CA explanation");
    assert_eq!(result.double_column_by_name("support").unwrap()[row], 1.0);
    assert_eq!(result.double_column_by_name("global_ratio").unwrap()[row], 2.0);
    assert_eq!(result.double_column_by_name("outlier_count").unwrap()[row], 3.0);
    assert_eq!(result.double_column_by_name("total_count").unwrap()[row], 3.0);
}

// S3: fused DIFF-JOIN over R |X| T and S |X| T
#[test]
fn test_diff_join_scenario() {
    let mut engine = QueryEngine::new();

    let mut r = ColumnTable::new();
    r.add_string_column(
        "A",
        vec!["a", "a", "b", "b"].into_iter().map(String::from).collect(),
    )
    .unwrap();
    let mut s = ColumnTable::new();
    s.add_string_column("A", vec!["c", "d", "e"].into_iter().map(String::from).collect())
        .unwrap();
    let mut t = ColumnTable::new();
    t.add_string_column(
        "A",
        vec!["a", "b", "c", "d", "e"].into_iter().map(String::from).collect(),
    )
    .unwrap();
    t.add_string_column(
        "state",
        vec!["CA", "CA", "TX", "TX", "FL"].into_iter().map(String::from).collect(),
    )
    .unwrap();
    engine.register_table("R", r);
    engine.register_table("S", s);
    engine.register_table("T", t);

    let natural_join = |left: &str| {
        select_query(
            vec![SelectItem::AllColumns],
            Relation::Join(Join {
                join_type: JoinType::Inner,
                left: Box::new(table_ref(left)),
                right: Box::new(table_ref("T")),
                criteria: Some(JoinCriteria::Natural),
            }),
            None,
        )
    };
    let query = diff_spec(
        DiffArgs::Subqueries {
            first: Box::new(natural_join("R")),
            second: Box::new(natural_join("S")),
        },
        vec!["state"],
        1.5,
        0.5,
    );
    let result = engine.execute_query(&query).unwrap();

    assert_eq!(result.num_rows(), 1);
    let row = row_for_value(&result, "state", "CA").expect("CA explanation");
    assert_eq!(result.double_column_by_name("outlier_count").unwrap()[row], 4.0);
    assert_eq!(result.double_column_by_name("total_count").unwrap()[row], 4.0);
    assert_eq!(result.double_column_by_name("support").unwrap()[row], 1.0);
    let ratio = result.double_column_by_name("global_ratio").unwrap()[row];
    assert!(ratio > 1.5, "global_ratio {} should exceed min ratio", ratio);
}

// S4: inner join output qualification through the dispatcher
#[test]
fn test_join_qualification_scenario() {
    let mut engine = QueryEngine::new();
    let mut b = ColumnTable::new();
    b.add_double_column("id", vec![1.0, 2.0]).unwrap();
    b.add_string_column("name", vec!["x".to_string(), "y".to_string()]).unwrap();
    let mut s = ColumnTable::new();
    s.add_double_column("id", vec![2.0]).unwrap();
    s.add_string_column("name", vec!["z".to_string()]).unwrap();
    engine.register_table("B", b);
    engine.register_table("S", s);

    let query = select_query(
        vec![SelectItem::AllColumns],
        Relation::Join(Join {
            join_type: JoinType::Inner,
            left: Box::new(table_ref("B")),
            right: Box::new(table_ref("S")),
            criteria: Some(JoinCriteria::On(ident("id"))),
        }),
        None,
    );
    let result = engine.execute_query(&query).unwrap();
    let mut names = result.schema().column_names();
    names.sort();
    assert_eq!(names, vec!["B.name", "S.name", "id"]);
}

// S5: ON * auto-selection keeps low-cardinality string columns
#[test]
fn test_auto_attribute_selection() {
    let mut t = ColumnTable::new();
    t.add_string_column("cat1", (0..1000).map(|i| format!("v{}", i % 5)).collect())
        .unwrap();
    t.add_string_column("cat2", (0..1000).map(|i| format!("v{}", i % 900)).collect())
        .unwrap();
    t.add_string_column("cat3", (0..1000).map(|i| format!("v{}", i % 50)).collect())
        .unwrap();

    let columns = find_explanation_columns(&t).unwrap();
    assert_eq!(columns, vec!["cat1".to_string(), "cat3".to_string()]);
}

// S5, end to end: ON * runs the summarizer over the auto-selected columns
#[test]
fn test_diff_with_wildcard_attributes() {
    let mut engine = QueryEngine::new();
    engine.register_table("T", split_table());

    let query = diff_spec(
        DiffArgs::Split(SplitQuery {
            relation: Box::new(table_ref("T")),
            where_clause: compare(CompareOp::GreaterThan, ident("metric"), dlit(5.0)),
        }),
        vec!["*"],
        2.0,
        0.4,
    );
    let result = engine.execute_query(&query).unwrap();
    // state and city both have < sample/4 distinct values on 6 rows? sample
    // is 6, 6/4 = 1, so no column qualifies and the result is empty
    assert_eq!(result.num_rows(), 0);
}

// S6: literal-vs-literal predicates
#[test]
fn test_literal_predicates() {
    let mut engine = QueryEngine::new();
    engine.register_table("D", numbers_table());

    let all = select_query(
        vec![SelectItem::AllColumns],
        table_ref("D"),
        Some(compare(CompareOp::Equal, dlit(1.0), dlit(1.0))),
    );
    assert_eq!(engine.execute_query(&all).unwrap().num_rows(), 5);

    let none = select_query(
        vec![SelectItem::AllColumns],
        table_ref("D"),
        Some(compare(CompareOp::Equal, dlit(1.0), dlit(2.0))),
    );
    assert_eq!(engine.execute_query(&none).unwrap().num_rows(), 0);
}

// law 7: UDF columns visible to WHERE and ORDER BY, WHERE before SELECT
#[test]
fn test_udf_visible_to_where_and_order_by() {
    let mut engine = QueryEngine::new();
    engine.register_table("D", numbers_table());

    let query = QueryBody::Select(QuerySpec {
        select: vec![SelectItem::Column {
            expr: Expression::FunctionCall {
                name: "normalize".to_string(),
                args: vec![ident("x")],
            },
            alias: Some("n".to_string()),
        }],
        from: table_ref("D"),
        where_clause: Some(compare(CompareOp::GreaterEqual, ident("n"), dlit(0.5))),
        order_by: vec![SortItem {
            key: ident("n"),
            ascending: false,
        }],
        limit: Some(Limit::Count(2)),
    });
    let result = engine.execute_query(&query).unwrap();
    assert_eq!(result.schema().column_names(), vec!["n"]);
    assert_eq!(result.double_column_by_name("n").unwrap(), &[1.0, 0.8]);
}

#[test]
fn test_where_on_projected_away_column() {
    let mut engine = QueryEngine::new();
    engine.register_table("D", numbers_table());

    let query = select_query(
        vec![column("name")],
        table_ref("D"),
        Some(compare(CompareOp::GreaterThan, ident("x"), dlit(3.0))),
    );
    let result = engine.execute_query(&query).unwrap();
    assert_eq!(result.schema().column_names(), vec!["name"]);
    assert_eq!(
        result.string_column_by_name("name").unwrap(),
        &["d".to_string(), "e".to_string()]
    );
}

#[test]
fn test_order_by_and_limit_all() {
    let mut engine = QueryEngine::new();
    engine.register_table("D", numbers_table());

    let query = QueryBody::Select(QuerySpec {
        select: vec![SelectItem::AllColumns],
        from: table_ref("D"),
        where_clause: None,
        order_by: vec![SortItem {
            key: ident("x"),
            ascending: false,
        }],
        limit: Some(Limit::All),
    });
    let result = engine.execute_query(&query).unwrap();
    assert_eq!(result.num_rows(), 5);
    assert_eq!(result.double_column_by_name("x").unwrap()[0], 5.0);
}

// general DIFF path: two subqueries that are not joins get tagged and
// stacked, and the summarizer result columns are renamed
#[test]
fn test_diff_two_subqueries_general_path() {
    let mut engine = QueryEngine::new();
    engine.register_table("T", split_table());

    let outliers = select_query(
        vec![SelectItem::AllColumns],
        table_ref("T"),
        Some(compare(CompareOp::GreaterThan, ident("metric"), dlit(5.0))),
    );
    let inliers = select_query(
        vec![SelectItem::AllColumns],
        table_ref("T"),
        Some(compare(CompareOp::LessEqual, ident("metric"), dlit(5.0))),
    );
    let query = diff_spec(
        DiffArgs::Subqueries {
            first: Box::new(outliers),
            second: Box::new(inliers),
        },
        vec!["state"],
        2.0,
        0.4,
    );
    let result = engine.execute_query(&query).unwrap();

    assert!(result.column_index("outlier_count").is_some());
    assert!(result.column_index("total_count").is_some());
    assert!(result.column_index("outliers").is_none());
    let row = row_for_value(&result, "state", "CA").expect("CA explanation");
    assert_eq!(result.double_column_by_name("outlier_count").unwrap()[row], 3.0);
}

#[test]
fn test_diff_missing_attribute_column() {
    let mut engine = QueryEngine::new();
    engine.register_table("T", split_table());

    let query = diff_spec(
        DiffArgs::Split(SplitQuery {
            relation: Box::new(table_ref("T")),
            where_clause: compare(CompareOp::GreaterThan, ident("metric"), dlit(5.0)),
        }),
        vec!["region"],
        2.0,
        0.4,
    );
    let err = engine.execute_query(&query).unwrap_err();
    assert!(matches!(err, DiffError::ColumnNotFound(_)));
}

#[test]
fn test_from_subquery_rejected() {
    let mut engine = QueryEngine::new();
    engine.register_table("D", numbers_table());

    let inner = select_query(vec![SelectItem::AllColumns], table_ref("D"), None);
    let query = select_query(
        vec![SelectItem::AllColumns],
        Relation::Subquery {
            query: Box::new(inner),
        },
        None,
    );
    let err = engine.execute_query(&query).unwrap_err();
    assert!(matches!(err, DiffError::UnsupportedQuery(_)));
}

#[test]
fn test_multi_column_order_by_rejected() {
    let mut engine = QueryEngine::new();
    engine.register_table("D", numbers_table());

    let query = QueryBody::Select(QuerySpec {
        select: vec![SelectItem::AllColumns],
        from: table_ref("D"),
        where_clause: None,
        order_by: vec![
            SortItem { key: ident("x"), ascending: true },
            SortItem { key: ident("name"), ascending: true },
        ],
        limit: None,
    });
    let err = engine.execute_query(&query).unwrap_err();
    assert!(matches!(err, DiffError::UnsupportedQuery(_)));
}

#[test]
fn test_unknown_table() {
    let mut engine = QueryEngine::new();
    let query = select_query(vec![SelectItem::AllColumns], table_ref("missing"), None);
    let err = engine.execute_query(&query).unwrap_err();
    assert!(matches!(err, DiffError::TableNotFound(_)));
}

// importing then reading returns an independent table
#[test]
fn test_import_isolated_from_mutation() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"state,metric\nCA,10.0\nTX,1.0\n").unwrap();

    let mut engine = QueryEngine::new();
    let schema = vec![
        ("state".to_string(), DataType::String),
        ("metric".to_string(), DataType::Double),
    ];
    let mut imported = engine
        .import_table_from_csv(file.path(), "T", &schema)
        .unwrap();
    imported.add_double_column("extra", vec![0.0, 0.0]).unwrap();

    let query = select_query(vec![SelectItem::AllColumns], table_ref("T"), None);
    let fetched = engine.execute_query(&query).unwrap();
    assert_eq!(fetched.num_columns(), 2);
    assert!(fetched.column_index("extra").is_none());
}

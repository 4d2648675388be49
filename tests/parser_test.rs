//! Integration tests for SOQL parsing through the public API.

use soql::dates::{DateLiteral, StaticDateLiteral};
use soql::syntax::{DateValue, Expr, InList, SelectItem};
use soql::{parse, SoqlError};

#[test]
fn test_keywords_are_case_insensitive() {
    let query = parse("select Name from Account where Name like 'A%' order by Name desc limit 5").unwrap();
    assert_eq!(query.from.name, "Account");
    assert_eq!(query.limit, Some(5));
    assert!(query.where_clause.is_some());
    assert_eq!(query.order_by.len(), 1);
}

#[test]
fn test_select_items_keep_aliases() {
    let query = parse("SELECT Name n, UPPER(Industry) ind, MAX(AnnualRevenue) top FROM Account GROUP BY Name, Industry").unwrap();
    let aliases: Vec<Option<&str>> = query
        .select
        .iter()
        .map(|item| match item {
            SelectItem::Field { alias, .. }
            | SelectItem::Function { alias, .. }
            | SelectItem::Aggregate { alias, .. } => alias.as_deref(),
            _ => None,
        })
        .collect();
    assert_eq!(aliases, vec![Some("n"), Some("ind"), Some("top")]);
    assert!(query.is_aggregate());
}

#[test]
fn test_relative_dates_in_in_list() {
    let query = parse("SELECT Id FROM Account WHERE CreatedDate IN (TODAY, YESTERDAY)").unwrap();
    let Some(Expr::In {
        list: InList::Values(values),
        negated: false,
        ..
    }) = query.where_clause
    else {
        panic!("expected IN list");
    };
    assert!(matches!(
        values[0],
        Expr::Date(DateValue::Relative(DateLiteral::Static(StaticDateLiteral::Today)), _)
    ));
    assert!(matches!(
        values[1],
        Expr::Date(DateValue::Relative(DateLiteral::Static(StaticDateLiteral::Yesterday)), _)
    ));
}

#[test]
fn test_nested_subqueries_parse() {
    let query = parse(
        "SELECT Name, (SELECT LastName FROM Contacts WHERE Email != null) \
         FROM Account WHERE Id IN (SELECT AccountId FROM Opportunity WHERE Amount > 1000)",
    )
    .unwrap();
    assert!(matches!(query.select[1], SelectItem::Subquery(_)));
    assert!(matches!(
        query.where_clause,
        Some(Expr::In {
            list: InList::Subquery(_),
            ..
        })
    ));
}

#[test]
fn test_parse_error_converts_to_soql_error() {
    let err: SoqlError = parse("SELECT Name FROM").unwrap_err().into();
    assert_eq!(err.code(), "PARSE_ERROR");
    let position = err.position().expect("parse errors are positioned");
    assert_eq!(position.line, 1);
}

#[test]
fn test_unterminated_string() {
    let err = parse("SELECT Name FROM Account WHERE Name = 'Acme").unwrap_err();
    assert_eq!(err.position.line, 1);
}

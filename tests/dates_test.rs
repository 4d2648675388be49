//! Relative date resolution against a fixed clock.
//!
//! "Now" is Friday 2024-03-15 with weeks starting Monday.

mod common;

use chrono::{NaiveDate, TimeZone, Utc, Weekday};
use common::{compile, fixed_resolver};
use soql::dates::{DateLiteral, DynamicDateKind, StaticDateLiteral};
use soql::{DateBound, Value};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn days(literal: DateLiteral) -> (NaiveDate, NaiveDate) {
    let range = fixed_resolver().resolve_range(literal).unwrap();
    (range.first_day, range.last_day)
}

#[test]
fn test_today() {
    let literal = DateLiteral::Static(StaticDateLiteral::Today);
    assert_eq!(days(literal), (day(2024, 3, 15), day(2024, 3, 15)));

    let range = fixed_resolver().resolve_range(literal).unwrap();
    assert_eq!(range.start, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
    assert_eq!(
        range.end,
        Utc.with_ymd_and_hms(2024, 3, 15, 23, 59, 59).unwrap() + chrono::Duration::nanoseconds(999_999_999)
    );
}

#[test]
fn test_this_week() {
    assert_eq!(
        days(DateLiteral::Static(StaticDateLiteral::ThisWeek)),
        (day(2024, 3, 11), day(2024, 3, 17))
    );
}

#[test]
fn test_last_n_days() {
    let literal = DateLiteral::Dynamic {
        kind: DynamicDateKind::LastNDays,
        n: 30,
    };
    assert_eq!(days(literal), (day(2024, 2, 14), day(2024, 3, 15)));
}

#[test]
fn test_next_n_days_includes_today() {
    let literal = DateLiteral::Dynamic {
        kind: DynamicDateKind::NextNDays,
        n: 7,
    };
    assert_eq!(days(literal), (day(2024, 3, 15), day(2024, 3, 22)));
}

#[test]
fn test_fiscal_year_starting_april() {
    let resolver = fixed_resolver().with_fiscal_year_start(4);
    let range = resolver
        .resolve_static_range(StaticDateLiteral::ThisFiscalYear)
        .unwrap();
    assert_eq!((range.first_day, range.last_day), (day(2023, 4, 1), day(2024, 3, 31)));

    let range = resolver
        .resolve_static_range(StaticDateLiteral::LastFiscalYear)
        .unwrap();
    assert_eq!((range.first_day, range.last_day), (day(2022, 4, 1), day(2023, 3, 31)));
}

#[test]
fn test_calendar_periods() {
    assert_eq!(
        days(DateLiteral::Static(StaticDateLiteral::ThisMonth)),
        (day(2024, 3, 1), day(2024, 3, 31))
    );
    assert_eq!(
        days(DateLiteral::Static(StaticDateLiteral::LastQuarter)),
        (day(2023, 10, 1), day(2023, 12, 31))
    );
    assert_eq!(
        days(DateLiteral::Static(StaticDateLiteral::NextYear)),
        (day(2025, 1, 1), day(2025, 12, 31))
    );
    let sunday = fixed_resolver().with_week_start(Weekday::Sun);
    let range = sunday
        .resolve_static_range(StaticDateLiteral::NextWeek)
        .unwrap();
    assert_eq!((range.first_day, range.last_day), (day(2024, 3, 17), day(2024, 3, 23)));
}

#[test]
fn test_resolve_compiled_range() {
    let mut compiled = compile("SELECT Name FROM Account WHERE CreatedDate = TODAY");
    assert_eq!(compiled.date_params.len(), 1);
    assert!(compiled.has_unresolved());

    fixed_resolver().resolve_all(&mut compiled).unwrap();
    assert!(!compiled.has_unresolved());
    assert_eq!(
        compiled.params[0],
        Value::Timestamp(Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap())
    );
    assert_eq!(
        compiled.params[1],
        Value::Timestamp(
            Utc.with_ymd_and_hms(2024, 3, 15, 23, 59, 59).unwrap()
                + chrono::Duration::nanoseconds(999_999_999)
        )
    );
}

#[test]
fn test_resolve_date_only_points() {
    let mut compiled = compile("SELECT Name FROM Opportunity WHERE CloseDate > LAST_MONTH AND CloseDate < NEXT_MONTH");
    assert_eq!(compiled.date_params[0].bound, DateBound::End);
    assert_eq!(compiled.date_params[1].bound, DateBound::Start);

    let resolver = fixed_resolver();
    resolver.resolve_date_params(&mut compiled).unwrap();
    assert_eq!(compiled.params[0], Value::Date(day(2024, 2, 29)));
    assert_eq!(compiled.params[1], Value::Date(day(2024, 4, 1)));

    // Resolving again recomputes the same values.
    let before = compiled.params.clone();
    resolver.resolve_date_params(&mut compiled).unwrap();
    assert_eq!(compiled.params, before);
}

#[test]
fn test_range_and_point_resolution_are_separate() {
    let mut compiled = compile(
        "SELECT Name FROM Account WHERE CreatedDate = THIS_WEEK AND CreatedDate >= LAST_N_DAYS:7",
    );
    let resolver = fixed_resolver();

    resolver.resolve_date_params(&mut compiled).unwrap();
    assert_eq!(compiled.params[0], Value::Unresolved);
    assert_eq!(compiled.params[1], Value::Unresolved);
    assert_eq!(
        compiled.params[2],
        Value::Timestamp(Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap())
    );

    resolver.resolve_date_params_for_range(&mut compiled).unwrap();
    assert_eq!(
        compiled.params[0],
        Value::Timestamp(Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap())
    );
    assert!(!compiled.has_unresolved());
}

//! End-to-end compilation snapshots: SOQL in, parameterized PostgreSQL out.

mod common;

use common::compile;
use insta::assert_snapshot;
use soql::Value;

#[test]
fn compile_filter_sort_and_page() {
    let c = compile(
        "SELECT Id, Name FROM Account WHERE Industry = 'Tech' \
         ORDER BY Name DESC NULLS LAST LIMIT 10 OFFSET 5",
    );
    assert_snapshot!(c.sql, @r#"SELECT "t0"."id" AS "Id", "t0"."name" AS "Name" FROM "accounts" "t0" WHERE "t0"."industry" = $1 ORDER BY "t0"."name" DESC NULLS LAST LIMIT 10 OFFSET 5"#);
    assert_eq!(c.params, vec![Value::String("Tech".into())]);
}

#[test]
fn compile_nested_negation() {
    let c = compile("SELECT Id FROM Account WHERE - -AnnualRevenue > 5 AND Name = 'x'");
    assert_snapshot!(c.sql, @r#"SELECT "t0"."id" AS "Id" FROM "accounts" "t0" WHERE - -"t0"."annual_revenue" > $1 AND "t0"."name" = $2"#);
    assert_eq!(c.params, vec![Value::Int(5), Value::String("x".into())]);
}

#[test]
fn compile_lookup_chain() {
    let c = compile("SELECT LastName, Account.Name, Account.Owner.Name FROM Contact");
    assert_snapshot!(c.sql, @r#"SELECT "t0"."last_name" AS "LastName", "t1"."name" AS "Account.Name", "t2"."name" AS "Account.Owner.Name" FROM "contacts" "t0" LEFT JOIN "accounts" "t1" ON "t0"."account_id" = "t1"."id" LEFT JOIN "users" "t2" ON "t1"."owner_id" = "t2"."id""#);
    assert_eq!(c.columns, vec!["LastName", "Account.Name", "Account.Owner.Name"]);
}

#[test]
fn compile_typeof() {
    let c = compile(
        "SELECT Subject, TYPEOF What WHEN Account THEN Name WHEN Opportunity THEN Amount END FROM Task",
    );
    assert_snapshot!(c.sql, @r#"SELECT "t0"."subject" AS "Subject", "t1"."name" AS "What(Account).Name", "t2"."amount" AS "What(Opportunity).Amount" FROM "tasks" "t0" LEFT JOIN "accounts" "t1" ON "t0"."what_id" = "t1"."id" AND "t0"."what_type" = $1 LEFT JOIN "opportunities" "t2" ON "t0"."what_id" = "t2"."id" AND "t0"."what_type" = $2"#);
    assert_eq!(
        c.params,
        vec![Value::String("Account".into()), Value::String("Opportunity".into())]
    );
}

#[test]
fn compile_typeof_else_coalesces() {
    let c = compile("SELECT TYPEOF What WHEN Account THEN Industry ELSE Name END FROM Task");
    assert!(c.sql.contains(r#""t1"."industry" AS "What(Account).Industry""#));
    assert!(c.sql.contains(r#""t2"."name" AS "What.Name""#));
    assert_eq!(c.columns, vec!["What(Account).Industry", "What.Name"]);
}

#[test]
fn compile_relationship_subquery() {
    let c = compile(
        "SELECT Name, (SELECT LastName FROM Contacts WHERE Email != null ORDER BY LastName LIMIT 5) \
         FROM Account WHERE Industry IN ('Tech', 'Media')",
    );
    assert_snapshot!(c.sql, @r#"SELECT "t0"."name" AS "Name", (SELECT COALESCE(json_agg(row_to_json("sq")), '[]'::json) FROM (SELECT "s0"."last_name" AS "LastName" FROM "contacts" "s0" WHERE "s0"."account_id" = "t0"."id" AND ("s0"."email" IS NOT NULL) ORDER BY "s0"."last_name" ASC LIMIT 5) AS "sq") AS "Contacts" FROM "accounts" "t0" WHERE "t0"."industry" IN ($1, $2)"#);
    assert_eq!(c.columns, vec!["Name", "Contacts"]);
}

#[test]
fn compile_aggregate_with_relative_date() {
    let c = compile(
        "SELECT Industry, COUNT(Id) total, AVG(AnnualRevenue) FROM Account \
         WHERE CreatedDate = LAST_N_DAYS:30 GROUP BY Industry HAVING COUNT(Id) > 5 ORDER BY Industry",
    );
    assert_snapshot!(c.sql, @r#"SELECT "t0"."industry" AS "Industry", COUNT("t0"."id") AS "total", AVG("t0"."annual_revenue") AS "expr0" FROM "accounts" "t0" WHERE ("t0"."created_at" >= $1 AND "t0"."created_at" <= $2) GROUP BY "t0"."industry" HAVING COUNT("t0"."id") > $3 ORDER BY "t0"."industry" ASC"#);
    assert_eq!(c.params, vec![Value::Unresolved, Value::Unresolved, Value::Int(5)]);
    assert_eq!(c.date_params.len(), 1);
    assert_eq!(c.date_params[0].end_index, Some(1));
}

#[test]
fn compile_where_subquery_and_not_in_dates() {
    let c = compile(
        "SELECT Name FROM Account WHERE Id IN (SELECT AccountId FROM Opportunity WHERE StageName = 'Won') \
         AND CreatedDate NOT IN (TODAY, YESTERDAY)",
    );
    assert!(c.sql.contains(
        r#""t0"."id" IN (SELECT "s0"."account_id" AS "AccountId" FROM "opportunities" "s0" WHERE "s0"."stage_name" = $1)"#
    ));
    assert!(c.sql.contains(
        r#"NOT (("t0"."created_at" >= $2 AND "t0"."created_at" <= $3) OR ("t0"."created_at" >= $4 AND "t0"."created_at" <= $5))"#
    ));
    assert_eq!(c.date_params.len(), 2);
}

#[test]
fn compile_functions() {
    let c = compile(
        "SELECT CALENDAR_YEAR(CreatedDate) yr, COUNT(Id) FROM Account GROUP BY CreatedDate",
    );
    assert!(c.sql.starts_with(
        r#"SELECT EXTRACT(YEAR FROM "t0"."created_at") AS "yr", COUNT("t0"."id") AS "expr0""#
    ));
}

#[test]
fn compile_schema_qualified_table() {
    let metadata = soql::StaticMetadata::new().with_object(
        soql::ObjectMeta::new("Invoice", "invoices")
            .with_schema("billing")
            .with_field(soql::FieldMeta::new("Id", soql::FieldType::Id)),
    );
    let engine = soql::Engine::builder()
        .metadata(metadata)
        .limits(soql::Limits::unlimited())
        .build();
    let c = engine
        .prepare(&soql::QueryContext::new(), "SELECT Id FROM Invoice FOR UPDATE")
        .unwrap();
    assert_snapshot!(c.sql, @r#"SELECT "t0"."id" AS "Id" FROM "billing"."invoices" "t0" FOR UPDATE"#);
    common::assert_valid_sql(&c.sql);
}

#[test]
fn compile_binds_every_literal_once() {
    let c = compile(
        "SELECT Name, Owner.Name, (SELECT LastName FROM Contacts WHERE CreatedDate > LAST_WEEK) \
         FROM Account WHERE (Name LIKE 'A%' OR AnnualRevenue >= 1000.5) AND Owner.IsActive = true \
         AND CreatedDate < 2024-01-01T00:00:00Z",
    );
    assert_eq!(c.params.len(), 5);
    assert_eq!(c.placeholders().len(), 5);
}

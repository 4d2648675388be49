//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use soql::access::AccessController;
use soql::{
    CompiledQuery, DateResolver, Engine, FieldMeta, FieldType, FixedClock, Limits, LookupMeta,
    ObjectMeta, QueryContext, RelationshipMeta, StaticMetadata, Validator,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// A small CRM schema.
///
/// ```text
/// Account ──Owner──▶ User ──Manager──▶ User
///    ▲  └─Contacts / Opportunities (children)
///    │
/// Contact, Opportunity ──Account──▶ Account
/// Task ──What──▶ Account | Opportunity   (polymorphic, type column what_type)
/// ```
pub fn crm_metadata() -> StaticMetadata {
    StaticMetadata::new()
        .with_object(
            ObjectMeta::new("Account", "accounts")
                .with_field(FieldMeta::new("Id", FieldType::Id))
                .with_field(FieldMeta::new("Name", FieldType::String))
                .with_field(FieldMeta::new("Industry", FieldType::Picklist))
                .with_field(
                    FieldMeta::new("AnnualRevenue", FieldType::Currency).column("annual_revenue"),
                )
                .with_field(FieldMeta::new("OwnerId", FieldType::Reference).column("owner_id"))
                .with_field(FieldMeta::new("CreatedDate", FieldType::DateTime).column("created_at"))
                .with_field(
                    FieldMeta::new("Description", FieldType::String)
                        .not_filterable()
                        .not_sortable()
                        .not_groupable(),
                )
                .with_field(FieldMeta::new("Rating", FieldType::Picklist).not_filterable())
                .with_lookup(LookupMeta::new("Owner", "OwnerId", "User"))
                .with_relationship(RelationshipMeta::new("Contacts", "Contact", "AccountId"))
                .with_relationship(RelationshipMeta::new(
                    "Opportunities",
                    "Opportunity",
                    "AccountId",
                )),
        )
        .with_object(
            ObjectMeta::new("Contact", "contacts")
                .with_field(FieldMeta::new("Id", FieldType::Id))
                .with_field(FieldMeta::new("LastName", FieldType::String).column("last_name"))
                .with_field(FieldMeta::new("Email", FieldType::String))
                .with_field(FieldMeta::new("AccountId", FieldType::Reference).column("account_id"))
                .with_field(FieldMeta::new("CreatedDate", FieldType::DateTime).column("created_at"))
                .with_lookup(LookupMeta::new("Account", "AccountId", "Account")),
        )
        .with_object(
            ObjectMeta::new("User", "users")
                .with_field(FieldMeta::new("Id", FieldType::Id))
                .with_field(FieldMeta::new("Name", FieldType::String))
                .with_field(FieldMeta::new("IsActive", FieldType::Boolean).column("is_active"))
                .with_field(FieldMeta::new("ManagerId", FieldType::Reference).column("manager_id"))
                .with_lookup(LookupMeta::new("Manager", "ManagerId", "User")),
        )
        .with_object(
            ObjectMeta::new("Opportunity", "opportunities")
                .with_field(FieldMeta::new("Id", FieldType::Id))
                .with_field(FieldMeta::new("Name", FieldType::String))
                .with_field(FieldMeta::new("Amount", FieldType::Currency))
                .with_field(FieldMeta::new("StageName", FieldType::Picklist).column("stage_name"))
                .with_field(FieldMeta::new("CloseDate", FieldType::Date).column("close_date"))
                .with_field(FieldMeta::new("AccountId", FieldType::Reference).column("account_id"))
                .with_lookup(LookupMeta::new("Account", "AccountId", "Account")),
        )
        .with_object(
            ObjectMeta::new("Task", "tasks")
                .with_field(FieldMeta::new("Id", FieldType::Id))
                .with_field(FieldMeta::new("Subject", FieldType::String))
                .with_field(FieldMeta::new("WhatId", FieldType::Reference).column("what_id"))
                .with_lookup(LookupMeta::polymorphic(
                    "What",
                    "WhatId",
                    ["Account", "Opportunity"],
                    "what_type",
                )),
        )
}

/// Friday 2024-03-15, mid-afternoon UTC.
pub fn fixed_resolver() -> DateResolver {
    let now = Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap();
    DateResolver::new(Arc::new(FixedClock::new(now)))
}

pub fn engine_with(limits: Limits) -> Engine {
    Engine::builder()
        .metadata(crm_metadata())
        .limits(limits)
        .date_resolver(fixed_resolver())
        .with_memory_cache()
        .build()
}

pub fn engine() -> Engine {
    engine_with(Limits::unlimited())
}

/// Parse, validate and compile with the given controller and limits.
pub fn compile_with(
    text: &str,
    access: &dyn AccessController,
    limits: &Limits,
) -> soql::SoqlResult<CompiledQuery> {
    let metadata = crm_metadata();
    let query = soql::parse(text)?;
    let validated = Validator::new(&metadata, access, limits).validate(&QueryContext::new(), &query)?;
    soql::Compiler::new(*limits).compile(&validated)
}

/// Compile against the CRM schema with no limits, checking the result is
/// well-formed PostgreSQL with consistent placeholders.
pub fn compile(text: &str) -> CompiledQuery {
    let compiled = compile_with(text, &soql::AllowAll, &Limits::unlimited())
        .unwrap_or_else(|e| panic!("failed to compile {:?}: {}", text, e));
    assert_valid_sql(&compiled.sql);
    compiled
        .check_invariants()
        .unwrap_or_else(|e| panic!("bad placeholders in {:?}: {}", compiled.sql, e));
    compiled
}

pub fn assert_valid_sql(sql: &str) {
    if let Err(e) = Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        panic!("invalid SQL: {}\n{}", e, sql);
    }
}

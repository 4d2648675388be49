//! # soql
//!
//! A metadata-driven SOQL query engine that compiles to parameterized
//! PostgreSQL.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      SOQL text                           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [syntax]
//! ┌─────────────────────────────────────────────────────────┐
//! │                     AST                                  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validation] + metadata, access, limits
//! ┌─────────────────────────────────────────────────────────┐
//! │       ValidatedQuery (resolved paths, join steps)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compiler]
//! ┌─────────────────────────────────────────────────────────┐
//! │   CompiledQuery (SQL, params, unresolved date params)    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [dates]
//! ┌─────────────────────────────────────────────────────────┐
//! │           Executable SQL with concrete params            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Engine`] ties the stages together and memoizes compiled queries.

pub mod access;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod context;
pub mod dates;
pub mod engine;
pub mod error;
pub mod limits;
pub mod metadata;
pub mod report;
pub mod sql;
pub mod syntax;
pub mod validation;

pub use access::{AccessController, AllowAll, CallbackAccess, DenyAll, FieldAllowList, ObjectAllowList};
pub use cache::{MemoryQueryCache, QueryCache};
pub use compiler::{CompiledQuery, Compiler, DateBound, DateParam, Value};
pub use config::Settings;
pub use context::QueryContext;
pub use dates::{Clock, DateLiteral, DateResolver, FixedClock, SystemClock};
pub use engine::{Engine, EngineBuilder, QueryBuilder};
pub use error::{
    AccessError, ErrorCategory, LimitError, LimitKind, ParseError, SoqlError, SoqlResult,
    ValidationCode, ValidationError,
};
pub use limits::Limits;
pub use metadata::{
    FieldMeta, FieldType, LookupMeta, MetadataProvider, ObjectMeta, RelationshipMeta,
    StaticMetadata,
};
pub use report::ValidationReport;
pub use syntax::{parse, Query};
pub use validation::{ValidatedQuery, Validator};

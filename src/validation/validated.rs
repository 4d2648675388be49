//! Output of validation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::metadata::{FieldMeta, ObjectMeta};
use crate::syntax::ast::{FieldPath, Query};

/// A query that passed validation, with every field reference resolved.
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    /// The FROM object.
    pub object: Arc<ObjectMeta>,
    pub query: Query,
    /// Resolved references keyed by canonical dotted path.
    pub refs: BTreeMap<String, ResolvedRef>,
    /// Source spelling of each path to its canonical key in `refs`.
    pub paths: HashMap<String, String>,
    /// TYPEOF `ELSE` fields, spelled `What.Name`, to the canonical paths of
    /// that field on every target not named in a `WHEN` branch.
    pub fallbacks: HashMap<String, Vec<String>>,
    /// Relationship and WHERE subqueries, keyed by the source offset of
    /// their `SELECT` keyword.
    pub subqueries: Vec<ValidatedSubquery>,
    pub is_aggregate: bool,
    /// Canonical paths of the GROUP BY clause, in order.
    pub group_by: Vec<String>,
    /// Distinct join steps in first-use order. Every step of every ref
    /// appears here exactly once, and after the step it hangs off.
    pub joins: Vec<JoinStep>,
}

impl ValidatedQuery {
    /// Resolved reference for a path as written in the query.
    pub fn resolve(&self, path: &FieldPath) -> Option<&ResolvedRef> {
        self.resolve_spelling(&path.dotted())
    }

    /// Resolved reference for a source spelling such as `a.Owner.Name` or
    /// `What(Account).Name`.
    pub fn resolve_spelling(&self, spelling: &str) -> Option<&ResolvedRef> {
        self.paths
            .get(spelling)
            .and_then(|canonical| self.refs.get(canonical))
    }

    pub fn fallback(&self, spelling: &str) -> Vec<&ResolvedRef> {
        self.fallbacks
            .get(spelling)
            .map(|paths| paths.iter().filter_map(|p| self.refs.get(p)).collect())
            .unwrap_or_default()
    }

    pub fn subquery_at(&self, offset: usize) -> Option<&ValidatedSubquery> {
        self.subqueries.iter().find(|s| s.offset == offset)
    }
}

/// Source spelling of a field inside a TYPEOF branch.
pub fn typeof_spelling(lookup: &FieldPath, object: &str, field: &FieldPath) -> String {
    format!("{}({}).{}", lookup.dotted(), object, field.dotted())
}

/// A field reference resolved against metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    /// Canonical dotted path, e.g. `Account.Owner.Name` or `What(Account).Name`.
    pub path: String,
    /// Object that owns the terminal field.
    pub object: String,
    pub field: FieldMeta,
    /// Joins needed to reach `object` from the FROM object, outermost first.
    pub joins: Vec<JoinStep>,
}

impl ResolvedRef {
    /// Number of lookups traversed.
    pub fn depth(&self) -> usize {
        self.joins.len()
    }

    /// Chain key of the table holding the field, or `None` for the FROM object.
    pub fn table_key(&self) -> Option<&str> {
        self.joins.last().map(|j| j.key.as_str())
    }
}

/// One lookup traversal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JoinStep {
    /// Chain identity, e.g. `Account`, `Account.Owner` or `What(Account)`.
    pub key: String,
    pub lookup: String,
    pub from_object: String,
    pub to_object: String,
    /// Foreign key column on the `from_object` table.
    pub fk_column: String,
    pub to_table: String,
    pub to_schema: Option<String>,
    pub to_id_column: String,
    /// For polymorphic lookups: the type column on the `from_object` table
    /// and the object name it must equal.
    pub discriminator: Option<(String, String)>,
}

/// How a subquery relates to its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubqueryKind {
    /// `(SELECT ... FROM Contacts)` in the select list.
    Relationship {
        name: String,
        /// Foreign key column on the child table pointing at the parent.
        child_column: String,
    },
    /// `Id IN (SELECT AccountId FROM Contact)` in a filter.
    Filter,
}

/// A validated subquery.
#[derive(Debug, Clone)]
pub struct ValidatedSubquery {
    pub offset: usize,
    pub kind: SubqueryKind,
    pub query: ValidatedQuery,
}

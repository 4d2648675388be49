//! Table aliases for one query level.

use std::collections::HashMap;

use crate::validation::{JoinStep, ResolvedRef, ValidatedQuery};

/// Maps join-chain keys to SQL table aliases.
///
/// The root query uses `t0` for the FROM table and `t1..` for joins in
/// first-use order. Subquery `n` uses `s{n}` and `s{n}_1..`.
#[derive(Debug, Clone)]
pub struct TableScope {
    root: String,
    joins: HashMap<String, String>,
}

impl TableScope {
    pub fn root(query: &ValidatedQuery) -> Self {
        Self::build(query, "t0".to_string(), |i| format!("t{}", i))
    }

    pub fn subquery(query: &ValidatedQuery, n: usize) -> Self {
        Self::build(query, format!("s{}", n), |i| format!("s{}_{}", n, i))
    }

    fn build(query: &ValidatedQuery, root: String, name: impl Fn(usize) -> String) -> Self {
        let joins = query
            .joins
            .iter()
            .enumerate()
            .map(|(i, step)| (step.key.clone(), name(i + 1)))
            .collect();
        Self { root, joins }
    }

    /// Alias of the FROM table.
    pub fn root_alias(&self) -> &str {
        &self.root
    }

    /// Alias of the table a join step lands on.
    pub fn join_alias(&self, key: &str) -> &str {
        self.joins.get(key).map(String::as_str).unwrap_or(&self.root)
    }

    /// Alias of the table a join step starts from.
    pub fn parent_alias(&self, step: &JoinStep) -> &str {
        match step.key.rfind('.') {
            Some(dot) => self.join_alias(&step.key[..dot]),
            None => &self.root,
        }
    }

    /// Alias of the table holding a resolved field.
    pub fn table_of(&self, resolved: &ResolvedRef) -> &str {
        match resolved.table_key() {
            Some(key) => self.join_alias(key),
            None => &self.root,
        }
    }
}

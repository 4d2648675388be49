//! Fluent query construction on top of [`Engine`].
//!
//! The builder only assembles SOQL text; everything else goes through the
//! same pipeline as hand-written queries.
//!
//! ```ignore
//! let compiled = engine
//!     .query(&ctx)
//!     .select(["Id", "Name"])
//!     .from("Account")
//!     .where_clause("Industry = 'Tech'")
//!     .order_by("Name DESC")
//!     .limit(10)
//!     .prepare()?;
//! ```

use std::sync::Arc;

use crate::compiler::CompiledQuery;
use crate::context::QueryContext;
use crate::error::SoqlResult;

use super::Engine;

/// Builds SOQL text clause by clause.
#[derive(Debug, Clone)]
#[must_use = "builders have no effect until used"]
pub struct QueryBuilder<'e> {
    engine: &'e Engine,
    ctx: QueryContext,
    select: Vec<String>,
    from: Option<String>,
    where_clause: Option<String>,
    group_by: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'e> QueryBuilder<'e> {
    pub(super) fn new(engine: &'e Engine, ctx: QueryContext) -> Self {
        Self {
            engine,
            ctx,
            select: Vec::new(),
            from: None,
            where_clause: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Append select items. Each item is SOQL text, e.g. `"Owner.Name"` or
    /// `"COUNT(Id) total"`.
    pub fn select<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(items.into_iter().map(Into::into));
        self
    }

    pub fn from(mut self, object: impl Into<String>) -> Self {
        self.from = Some(object.into());
        self
    }

    /// Set the WHERE condition. Calling it again ANDs the conditions.
    pub fn where_clause(mut self, condition: impl Into<String>) -> Self {
        let condition = condition.into();
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => format!("({}) AND ({})", existing, condition),
            None => condition,
        });
        self
    }

    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Append an ORDER BY item such as `"Name DESC NULLS LAST"`.
    pub fn order_by(mut self, item: impl Into<String>) -> Self {
        self.order_by.push(item.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Render the query as SOQL text.
    ///
    /// With no select items the query selects `Id`.
    pub fn to_soql(&self) -> String {
        let select = if self.select.is_empty() {
            "Id".to_string()
        } else {
            self.select.join(", ")
        };
        let mut soql = format!("SELECT {} FROM {}", select, self.from.as_deref().unwrap_or(""));

        if let Some(condition) = &self.where_clause {
            soql.push_str(" WHERE ");
            soql.push_str(condition);
        }
        if !self.group_by.is_empty() {
            soql.push_str(" GROUP BY ");
            soql.push_str(&self.group_by.join(", "));
        }
        if !self.order_by.is_empty() {
            soql.push_str(" ORDER BY ");
            soql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            soql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            soql.push_str(&format!(" OFFSET {}", offset));
        }
        soql
    }

    pub fn prepare(&self) -> SoqlResult<Arc<CompiledQuery>> {
        self.engine.prepare(&self.ctx, &self.to_soql())
    }

    pub fn prepare_and_resolve(&self) -> SoqlResult<CompiledQuery> {
        self.engine.prepare_and_resolve(&self.ctx, &self.to_soql())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_soql_orders_clauses() {
        let engine = Engine::builder().build();
        let ctx = QueryContext::new();
        let soql = engine
            .query(&ctx)
            .offset(20)
            .limit(10)
            .order_by("Name DESC")
            .where_clause("Industry = 'Tech'")
            .where_clause("AnnualRevenue > 1000")
            .from("Account")
            .select(["Id", "Name"])
            .to_soql();
        assert_eq!(
            soql,
            "SELECT Id, Name FROM Account WHERE (Industry = 'Tech') AND (AnnualRevenue > 1000) \
             ORDER BY Name DESC LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_default_select() {
        let engine = Engine::builder().build();
        let ctx = QueryContext::new();
        let soql = engine
            .query(&ctx)
            .from("Account")
            .group_by(["Industry"])
            .to_soql();
        assert_eq!(soql, "SELECT Id FROM Account GROUP BY Industry");
    }
}

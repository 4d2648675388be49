//! Semantic validation of parsed queries.
//!
//! The [`Validator`] checks a [`Query`] against object metadata, access
//! control and resource limits, and produces a [`ValidatedQuery`] in which
//! every field reference is resolved to a column and a chain of joins.
//!
//! Validation is fail-fast: the first problem found is returned.
//!
//! # Example
//!
//! ```ignore
//! use soql::access::AllowAll;
//! use soql::limits::Limits;
//! use soql::validation::Validator;
//!
//! let validator = Validator::new(&metadata, &AllowAll, &Limits::recommended());
//! let validated = validator.validate(&ctx, &query)?;
//! for (path, r) in &validated.refs {
//!     println!("{} -> {}", path, r.field.column);
//! }
//! ```

mod functions;
mod resolve;
mod types;
mod validated;

pub use functions::{lookup as lookup_function, names as function_names, ArgKind, FunctionSig, Returns, SqlForm};
pub use resolve::{Clause, MAX_LOOKUP_LEVELS};
pub use types::ExprType;
pub use validated::*;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::access::AccessController;
use crate::context::QueryContext;
use crate::error::{SoqlError, SoqlResult, ValidationCode, ValidationError};
use crate::limits::Limits;
use crate::metadata::{MetadataProvider, ObjectMeta};
use crate::syntax::ast::*;
use crate::syntax::span::Position;
use resolve::Scope;

/// Checks queries against metadata, access control and limits.
pub struct Validator<'a> {
    metadata: &'a dyn MetadataProvider,
    access: &'a dyn AccessController,
    limits: &'a Limits,
}

impl<'a> Validator<'a> {
    pub fn new(
        metadata: &'a dyn MetadataProvider,
        access: &'a dyn AccessController,
        limits: &'a Limits,
    ) -> Self {
        Self {
            metadata,
            access,
            limits,
        }
    }

    pub fn validate(&self, ctx: &QueryContext, query: &Query) -> SoqlResult<ValidatedQuery> {
        if ctx.is_cancelled() {
            return Err(SoqlError::Cancelled);
        }

        let mut checker = Checker {
            metadata: self.metadata,
            access: self.access,
            limits: self.limits,
            ctx,
            subqueries: 0,
        };
        let result = checker.check_root(query);
        if let Err(err) = &result {
            debug!(code = err.code(), error = %err, "query rejected");
        }
        result
    }
}

/// Where a query sits relative to the statement root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Root,
    Relationship,
    Filter,
}

/// Context for checking one expression.
#[derive(Debug, Clone, Copy)]
struct ExprCtx {
    clause: Clause,
    allow_aggregates: bool,
}

impl ExprCtx {
    fn new(clause: Clause, allow_aggregates: bool) -> Self {
        Self {
            clause,
            allow_aggregates,
        }
    }
}

/// State of one query level while it is being checked.
struct QueryState {
    scope: Scope,
    level: Level,
    /// Field references outside any aggregate, from SELECT, HAVING and
    /// ORDER BY. In aggregate queries each must be grouped.
    bare: Vec<(String, Position)>,
    subqueries: Vec<ValidatedSubquery>,
}

/// Validation pass over one statement.
struct Checker<'a> {
    metadata: &'a dyn MetadataProvider,
    access: &'a dyn AccessController,
    limits: &'a Limits,
    ctx: &'a QueryContext,
    /// Subqueries seen so far, across all levels.
    subqueries: usize,
}

fn invalid(code: ValidationCode, message: impl Into<String>, position: Position) -> SoqlError {
    ValidationError::new(code, message).at(position).into()
}

fn strip_parens(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(inner) => strip_parens(inner),
        other => other,
    }
}

fn relative_date(expr: &Expr) -> Option<Position> {
    match strip_parens(expr) {
        Expr::Date(DateValue::Relative(_), position) => Some(*position),
        _ => None,
    }
}

impl Checker<'_> {
    // ========================================================================
    // Queries
    // ========================================================================

    fn check_root(&mut self, query: &Query) -> SoqlResult<ValidatedQuery> {
        let object = self.object(&query.from.name, query.from.position)?;

        let leaves: usize = query.select.iter().map(SelectItem::leaf_count).sum();
        self.limits
            .check_select_fields(leaves)
            .map_err(|e| e.at(query.position))?;

        self.check_query(query, object, Level::Root)
    }

    fn check_query(
        &mut self,
        query: &Query,
        object: Arc<ObjectMeta>,
        level: Level,
    ) -> SoqlResult<ValidatedQuery> {
        let mut state = QueryState {
            scope: Scope::new(object, query.from.alias.clone()),
            level,
            bare: Vec::new(),
            subqueries: Vec::new(),
        };
        let is_aggregate = query.is_aggregate()
            || query.select.iter().any(|item| {
                matches!(item, SelectItem::Function { call, .. }
                    if call.args.iter().any(Expr::contains_aggregate))
            });

        // SELECT
        for item in &query.select {
            self.check_select_item(&mut state, item, is_aggregate)?;
        }

        // WHERE
        if let Some(filter) = &query.where_clause {
            let ty = self.check_expr(&mut state, filter, ExprCtx::new(Clause::Where, false))?;
            require_condition(ty, "WHERE", filter.position())?;
        }

        // GROUP BY
        self.limits
            .check_group_by_fields(query.group_by.len())
            .map_err(|e| e.at(query.position))?;
        let mut group_by = Vec::with_capacity(query.group_by.len());
        for path in &query.group_by {
            let resolved = self.resolve_path(&mut state.scope, path, Clause::GroupBy)?;
            group_by.push(resolved.path);
        }

        // HAVING
        if let Some(having) = &query.having {
            if query.group_by.is_empty() {
                return Err(invalid(
                    ValidationCode::MissingRequiredClause,
                    "HAVING requires GROUP BY",
                    having.position(),
                ));
            }
            let ty = self.check_expr(&mut state, having, ExprCtx::new(Clause::Having, true))?;
            require_condition(ty, "HAVING", having.position())?;
        }

        // ORDER BY
        self.limits
            .check_order_by_fields(query.order_by.len())
            .map_err(|e| e.at(query.position))?;
        for item in &query.order_by {
            self.check_expr(&mut state, &item.expr, ExprCtx::new(Clause::OrderBy, is_aggregate))?;
        }

        self.check_pagination(query, level)?;

        // Grouping rules
        if is_aggregate {
            let grouped: HashSet<&str> = group_by.iter().map(String::as_str).collect();
            if let Some((path, position)) = state
                .bare
                .iter()
                .find(|(path, _)| !grouped.contains(path.as_str()))
            {
                return Err(ValidationError::new(
                    ValidationCode::FieldNotGrouped,
                    format!("field {} must be grouped or aggregated", path),
                )
                .with_field(path.clone())
                .at(*position)
                .into());
            }
            if query.for_update {
                return Err(invalid(
                    ValidationCode::InvalidExpression,
                    "FOR UPDATE cannot be used with aggregate queries",
                    query.position,
                ));
            }
        }
        if query.for_update && level != Level::Root {
            return Err(invalid(
                ValidationCode::InvalidExpression,
                "FOR UPDATE is only allowed on the outer query",
                query.position,
            ));
        }

        let scope = state.scope;
        Ok(ValidatedQuery {
            object: scope.object,
            query: query.clone(),
            refs: scope.refs,
            paths: scope.paths,
            fallbacks: scope.fallbacks,
            subqueries: state.subqueries,
            is_aggregate,
            group_by,
            joins: scope.joins,
        })
    }

    fn check_select_item(
        &mut self,
        state: &mut QueryState,
        item: &SelectItem,
        is_aggregate: bool,
    ) -> SoqlResult<()> {
        let cx = ExprCtx::new(Clause::Select, true);
        match item {
            SelectItem::Field { path, .. } => {
                let resolved = self.resolve_path(&mut state.scope, path, Clause::Select)?;
                state.bare.push((resolved.path, path.position));
            }
            SelectItem::Aggregate { call, .. } => {
                self.check_aggregate(state, call)?;
            }
            SelectItem::Function { call, .. } => {
                self.check_function(state, call, cx)?;
            }
            SelectItem::TypeOf(typeof_) => {
                if is_aggregate {
                    return Err(invalid(
                        ValidationCode::InvalidExpression,
                        "TYPEOF cannot be used in aggregate queries",
                        typeof_.position,
                    ));
                }
                self.resolve_typeof(&mut state.scope, typeof_)?;
            }
            SelectItem::Subquery(sub) => {
                if state.level != Level::Root {
                    return Err(invalid(
                        ValidationCode::NestedSubqueryNotAllowed,
                        "subqueries cannot be nested",
                        sub.position,
                    ));
                }
                if is_aggregate {
                    return Err(invalid(
                        ValidationCode::InvalidExpression,
                        "relationship subqueries cannot be used in aggregate queries",
                        sub.position,
                    ));
                }
                let validated = self.check_relationship_subquery(&state.scope.object, sub)?;
                state.subqueries.push(validated);
            }
        }
        Ok(())
    }

    fn check_pagination(&self, query: &Query, level: Level) -> SoqlResult<()> {
        if let Some(limit) = query.limit {
            if limit == 0 {
                return Err(invalid(
                    ValidationCode::InvalidPagination,
                    "LIMIT must be greater than zero",
                    query.position,
                ));
            }
            let checked = match level {
                Level::Relationship => self.limits.check_subquery_records(limit),
                Level::Root | Level::Filter => self.limits.check_records(limit),
            };
            checked.map_err(|e| e.at(query.position))?;
        }
        if let Some(offset) = query.offset {
            if level == Level::Relationship {
                return Err(invalid(
                    ValidationCode::InvalidPagination,
                    "OFFSET is not allowed in relationship subqueries",
                    query.position,
                ));
            }
            self.limits
                .check_offset(offset)
                .map_err(|e| e.at(query.position))?;
        }
        Ok(())
    }

    // ========================================================================
    // Subqueries
    // ========================================================================

    fn count_subquery(&mut self, position: Position) -> SoqlResult<()> {
        self.subqueries += 1;
        self.limits
            .check_subqueries(self.subqueries)
            .map_err(|e| e.at(position).into())
    }

    fn check_relationship_subquery(
        &mut self,
        parent: &ObjectMeta,
        sub: &Query,
    ) -> SoqlResult<ValidatedSubquery> {
        self.count_subquery(sub.position)?;

        let relationship = parent.relationship(&sub.from.name).ok_or_else(|| {
            ValidationError::new(
                ValidationCode::UnknownRelationship,
                format!("no child relationship {} on {}", sub.from.name, parent.name),
            )
            .with_object(parent.name.clone())
            .at(sub.from.position)
        })?;
        let child = self.object(&relationship.child_object, sub.from.position)?;
        let child_column = child
            .field(&relationship.child_field)
            .map(|f| f.column.clone())
            .ok_or_else(|| {
                ValidationError::new(
                    ValidationCode::UnknownField,
                    format!(
                        "relationship {} refers to unknown field {}",
                        relationship.name, relationship.child_field
                    ),
                )
                .with_object(child.name.clone())
                .at(sub.from.position)
            })?;

        let query = self.check_query(sub, child, Level::Relationship)?;
        Ok(ValidatedSubquery {
            offset: sub.position.offset,
            kind: SubqueryKind::Relationship {
                name: relationship.name.clone(),
                child_column,
            },
            query,
        })
    }

    /// Check a WHERE subquery and return the type of its single field.
    fn check_filter_subquery(&mut self, state: &mut QueryState, sub: &Query) -> SoqlResult<ExprType> {
        if state.level != Level::Root {
            return Err(invalid(
                ValidationCode::NestedSubqueryNotAllowed,
                "subqueries cannot be nested",
                sub.position,
            ));
        }
        self.count_subquery(sub.position)?;

        let path = match sub.select.as_slice() {
            [SelectItem::Field { path, .. }] => path,
            [SelectItem::Aggregate { .. }] => {
                return Err(invalid(
                    ValidationCode::WhereSubqueryAggregateField,
                    "a WHERE subquery cannot select an aggregate",
                    sub.position,
                ))
            }
            [SelectItem::Function { call, .. }] if call.args.iter().any(Expr::contains_aggregate) => {
                return Err(invalid(
                    ValidationCode::WhereSubqueryAggregateField,
                    "a WHERE subquery cannot select an aggregate",
                    sub.position,
                ))
            }
            [SelectItem::Subquery(inner)] => {
                return Err(invalid(
                    ValidationCode::NestedSubqueryNotAllowed,
                    "subqueries cannot be nested",
                    inner.position,
                ))
            }
            _ => {
                return Err(invalid(
                    ValidationCode::WhereSubquerySingleField,
                    "a WHERE subquery must select exactly one field",
                    sub.position,
                ))
            }
        };

        let object = self.object(&sub.from.name, sub.from.position)?;
        let query = self.check_query(sub, object, Level::Filter)?;
        let ty = query
            .resolve(path)
            .map(|r| ExprType::from(r.field.field_type))
            .unwrap_or(ExprType::Null);

        state.subqueries.push(ValidatedSubquery {
            offset: sub.position.offset,
            kind: SubqueryKind::Filter,
            query,
        });
        Ok(ty)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn check_expr(&mut self, state: &mut QueryState, expr: &Expr, cx: ExprCtx) -> SoqlResult<ExprType> {
        match expr {
            Expr::Or(left, right) | Expr::And(left, right) => {
                let op = if matches!(expr, Expr::Or(..)) { "OR" } else { "AND" };
                for side in [left, right] {
                    let ty = self.check_expr(state, side, cx)?;
                    require_condition(ty, op, side.position())?;
                }
                Ok(ExprType::Boolean)
            }
            Expr::Not(inner) => {
                let ty = self.check_expr(state, inner, cx)?;
                require_condition(ty, "NOT", inner.position())?;
                Ok(ExprType::Boolean)
            }
            Expr::Compare { left, right, .. } => {
                self.check_comparison(state, left, right, cx)?;
                Ok(ExprType::Boolean)
            }
            Expr::In { expr: lhs, list, .. } => {
                match list {
                    InList::Values(values) => {
                        for value in values {
                            self.check_comparison(state, lhs, value, cx)?;
                        }
                    }
                    InList::Subquery(sub) => {
                        if cx.clause != Clause::Where {
                            return Err(invalid(
                                ValidationCode::InvalidExpression,
                                "subqueries are only allowed in WHERE",
                                sub.position,
                            ));
                        }
                        let lt = self.check_expr(state, lhs, cx)?;
                        let st = self.check_filter_subquery(state, sub)?;
                        if !lt.compatible(st) {
                            return Err(type_mismatch(lt, st, sub.position));
                        }
                    }
                }
                Ok(ExprType::Boolean)
            }
            Expr::Like { expr: lhs, pattern, .. } => {
                for side in [lhs, pattern] {
                    let ty = self.check_expr(state, side, cx)?;
                    if !ExprType::Text.compatible(ty) {
                        return Err(type_mismatch(ExprType::Text, ty, side.position()));
                    }
                }
                Ok(ExprType::Boolean)
            }
            Expr::IsNull { expr: inner, .. } => {
                self.check_expr(state, inner, cx)?;
                Ok(ExprType::Boolean)
            }
            Expr::Arithmetic { op, left, right } => {
                let expected = if *op == ArithmeticOp::Concat {
                    ExprType::Text
                } else {
                    ExprType::Number
                };
                for side in [left, right] {
                    let ty = self.check_expr(state, side, cx)?;
                    let ok = ty == ExprType::Null
                        || ty == expected
                        || (expected == ExprType::Text && ty == ExprType::Number);
                    if !ok {
                        return Err(type_mismatch(expected, ty, side.position()));
                    }
                }
                Ok(expected)
            }
            Expr::Negate(inner) => {
                let ty = self.check_expr(state, inner, cx)?;
                if !ExprType::Number.compatible(ty) {
                    return Err(type_mismatch(ExprType::Number, ty, inner.position()));
                }
                Ok(ExprType::Number)
            }
            Expr::Literal(literal, _) => Ok(literal.literal_type().into()),
            Expr::Date(value, position) => match value {
                DateValue::Relative(literal) => Err(ValidationError::new(
                    ValidationCode::InvalidDateLiteral,
                    format!("{} can only be compared with a date field", literal),
                )
                .at(*position)
                .into()),
                other => Ok(other.literal_type().into()),
            },
            Expr::Field(path) => {
                let resolved = self.resolve_path(&mut state.scope, path, cx.clause)?;
                let ty = resolved.field.field_type.into();
                if cx.clause != Clause::Where {
                    state.bare.push((resolved.path, path.position));
                }
                Ok(ty)
            }
            Expr::Function(call) => self.check_function(state, call, cx),
            Expr::Aggregate(call) => {
                if !cx.allow_aggregates {
                    let message = match cx.clause {
                        Clause::Where => "aggregate functions are not allowed in WHERE",
                        _ => "aggregate functions require an aggregate query",
                    };
                    return Err(invalid(ValidationCode::InvalidExpression, message, call.position));
                }
                self.check_aggregate(state, call)
            }
            Expr::Paren(inner) => self.check_expr(state, inner, cx),
        }
    }

    /// Check `left <op> right`, including relative date operands.
    fn check_comparison(
        &mut self,
        state: &mut QueryState,
        left: &Expr,
        right: &Expr,
        cx: ExprCtx,
    ) -> SoqlResult<()> {
        match (relative_date(left), relative_date(right)) {
            (Some(position), Some(_)) => Err(invalid(
                ValidationCode::InvalidDateLiteral,
                "relative date literals cannot be compared with each other",
                position,
            )),
            (Some(position), None) => {
                let ty = self.check_expr(state, right, cx)?;
                require_temporal(ty, position)
            }
            (None, Some(position)) => {
                let ty = self.check_expr(state, left, cx)?;
                require_temporal(ty, position)
            }
            (None, None) => {
                let lt = self.check_expr(state, left, cx)?;
                let rt = self.check_expr(state, right, cx)?;
                check_operands(left, lt, right, rt)
            }
        }
    }

    fn check_function(
        &mut self,
        state: &mut QueryState,
        call: &FunctionCall,
        cx: ExprCtx,
    ) -> SoqlResult<ExprType> {
        let sig = functions::lookup(&call.name).ok_or_else(|| {
            ValidationError::new(
                ValidationCode::UnknownFunction,
                format!("unknown function {}", call.name),
            )
            .at(call.position)
        })?;
        if !sig.accepts_arity(call.args.len()) {
            return Err(invalid(
                ValidationCode::InvalidExpression,
                format!("wrong number of arguments to {}: {}", sig.name, call.args.len()),
                call.position,
            ));
        }

        let mut first: Option<ExprType> = None;
        for (i, arg) in call.args.iter().enumerate() {
            let ty = self.check_expr(state, arg, cx)?;
            if !sig.arg_kind(i).accepts(ty) {
                return Err(invalid(
                    ValidationCode::TypeMismatch,
                    format!("argument {} of {} cannot be {}", i + 1, sig.name, ty),
                    arg.position(),
                ));
            }
            if sig.returns == Returns::FirstArg && ty != ExprType::Null {
                match first {
                    Some(expected) if !expected.compatible(ty) => {
                        return Err(type_mismatch(expected, ty, arg.position()));
                    }
                    None => first = Some(ty),
                    _ => {}
                }
            }
        }

        Ok(match sig.returns {
            Returns::Fixed(ty) => ty,
            Returns::FirstArg => first.unwrap_or(ExprType::Null),
        })
    }

    fn check_aggregate(
        &mut self,
        state: &mut QueryState,
        call: &AggregateCall,
    ) -> SoqlResult<ExprType> {
        let arg = match &call.arg {
            None if call.function == AggregateFunction::Count => return Ok(ExprType::Number),
            None => {
                return Err(invalid(
                    ValidationCode::InvalidExpression,
                    format!("{} requires a field", call.function.name()),
                    call.position,
                ))
            }
            Some(arg) => arg,
        };
        let path = match strip_parens(arg) {
            Expr::Field(path) => path,
            other => {
                return Err(invalid(
                    ValidationCode::InvalidExpression,
                    format!("the argument of {} must be a field", call.function.name()),
                    other.position(),
                ))
            }
        };

        let resolved = self.resolve_path(&mut state.scope, path, Clause::Select)?;
        let field = &resolved.field;
        let numeric_only = matches!(call.function, AggregateFunction::Sum | AggregateFunction::Avg);
        if !field.aggregatable || (numeric_only && !field.field_type.is_numeric()) {
            return Err(ValidationError::new(
                ValidationCode::FieldNotAggregatable,
                format!(
                    "field {} cannot be used with {}",
                    resolved.path,
                    call.function.name()
                ),
            )
            .with_object(resolved.object.clone())
            .with_field(field.name.clone())
            .at(path.position)
            .into());
        }

        Ok(match call.function {
            AggregateFunction::Min | AggregateFunction::Max => field.field_type.into(),
            _ => ExprType::Number,
        })
    }
}

fn type_mismatch(expected: ExprType, got: ExprType, position: Position) -> SoqlError {
    invalid(
        ValidationCode::TypeMismatch,
        format!("expected {}, got {}", expected, got),
        position,
    )
}

fn require_condition(ty: ExprType, context: &str, position: Position) -> SoqlResult<()> {
    if ty == ExprType::Boolean {
        Ok(())
    } else {
        Err(invalid(
            ValidationCode::InvalidExpression,
            format!("{} expects a condition, got {}", context, ty),
            position,
        ))
    }
}

fn require_temporal(ty: ExprType, position: Position) -> SoqlResult<()> {
    if ty.is_temporal() {
        Ok(())
    } else {
        Err(invalid(
            ValidationCode::InvalidDateLiteral,
            format!("date literal compared with a {} value", ty),
            position,
        ))
    }
}

/// Type check two non-relative comparison operands.
fn check_operands(left: &Expr, lt: ExprType, right: &Expr, rt: ExprType) -> SoqlResult<()> {
    for (value, vt, other) in [(left, lt, rt), (right, rt, lt)] {
        if let Expr::Date(_, position) = strip_parens(value) {
            let fits = match vt {
                ExprType::DateTime => other == ExprType::DateTime,
                _ => other.is_temporal(),
            };
            if !fits && other != ExprType::Null {
                return Err(invalid(
                    ValidationCode::InvalidDateLiteral,
                    format!("{} literal compared with a {} value", vt, other),
                    *position,
                ));
            }
        }
    }
    if lt.compatible(rt) {
        Ok(())
    } else {
        Err(type_mismatch(lt, rt, right.position()))
    }
}

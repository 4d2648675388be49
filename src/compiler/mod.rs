//! Compilation of validated queries to parameterized PostgreSQL.
//!
//! The compiler walks a [`ValidatedQuery`] and writes a [`TokenStream`]:
//!
//! ```text
//! ValidatedQuery → select list → FROM + LEFT JOINs → WHERE → GROUP BY
//!                → HAVING → ORDER BY → LIMIT/OFFSET → FOR UPDATE
//! ```
//!
//! Every literal becomes a `$n` bind parameter. Relative date literals such
//! as `TODAY` or `LAST_N_DAYS:30` become [`Value::Unresolved`] placeholders
//! with a [`DateParam`] record, so a compiled query can be cached and
//! resolved against the clock each time it runs.
//!
//! # Example
//!
//! ```ignore
//! use soql::compiler::Compiler;
//! use soql::limits::Limits;
//!
//! let compiled = Compiler::new(Limits::recommended()).compile(&validated)?;
//! println!("{}", compiled.sql);
//! ```

mod compiled;
mod scope;

pub use compiled::{CompiledQuery, DateBound, DateParam, Value};
pub use scope::TableScope;

use chrono::Utc;
use tracing::debug;

use crate::dates::DateLiteral;
use crate::error::{SoqlError, SoqlResult, ValidationCode, ValidationError};
use crate::limits::Limits;
use crate::metadata::FieldType;
use crate::sql::{Token, TokenStream};
use crate::syntax::ast::*;
use crate::syntax::span::Position;
use crate::validation::{
    lookup_function, typeof_spelling, JoinStep, ResolvedRef, SqlForm, SubqueryKind,
    ValidatedQuery, ValidatedSubquery,
};

/// Alias of the derived table wrapped around relationship subqueries.
const ROWS_ALIAS: &str = "sq";

/// Compiles validated queries to SQL.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    limits: Limits,
}

impl Compiler {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn compile(&self, query: &ValidatedQuery) -> SoqlResult<CompiledQuery> {
        let mut emitter = Emitter {
            limits: &self.limits,
            params: Vec::new(),
            date_params: Vec::new(),
            subqueries: 0,
        };
        let frame = Frame {
            query,
            scope: TableScope::root(query),
        };
        let (tokens, columns) = emitter.statement(&frame, &Role::Root)?;

        let compiled = CompiledQuery {
            sql: tokens.serialize(),
            params: emitter.params,
            date_params: emitter.date_params,
            columns,
        };
        debug!(
            object = %query.object.name,
            params = compiled.params.len(),
            date_params = compiled.date_params.len(),
            "compiled query"
        );
        Ok(compiled)
    }
}

/// How a statement relates to its parent.
enum Role {
    Root,
    /// Correlated child rows: `child.child_column = parent.id`.
    Relationship {
        parent_alias: String,
        parent_id: String,
        child_column: String,
    },
    /// `IN (SELECT ...)` filter.
    Filter,
}

/// One query level being compiled.
struct Frame<'q> {
    query: &'q ValidatedQuery,
    scope: TableScope,
}

impl<'q> Frame<'q> {
    fn resolve(&self, path: &FieldPath) -> SoqlResult<&'q ResolvedRef> {
        self.query
            .resolve(path)
            .ok_or_else(|| unresolved(&path.dotted(), path.position))
    }

    fn resolve_spelling(&self, spelling: &str, position: Position) -> SoqlResult<&'q ResolvedRef> {
        self.query
            .resolve_spelling(spelling)
            .ok_or_else(|| unresolved(spelling, position))
    }

    fn subquery(&self, sub: &Query) -> SoqlResult<&'q ValidatedSubquery> {
        self.query.subquery_at(sub.position.offset).ok_or_else(|| {
            internal("subquery was not validated", sub.position)
        })
    }

    /// `"alias"."column"` for a resolved field.
    fn column(&self, resolved: &ResolvedRef) -> Token {
        Token::Column {
            table: self.scope.table_of(resolved).to_string(),
            name: resolved.field.column.clone(),
        }
    }
}

fn internal(message: &str, position: Position) -> SoqlError {
    ValidationError::new(ValidationCode::InvalidExpression, message)
        .at(position)
        .into()
}

fn unresolved(spelling: &str, position: Position) -> SoqlError {
    internal(&format!("field {} was not validated", spelling), position)
}

/// Mutable state for one compilation.
struct Emitter<'a> {
    limits: &'a Limits,
    params: Vec<Value>,
    date_params: Vec<DateParam>,
    /// Subqueries emitted so far; numbers their aliases.
    subqueries: usize,
}

impl Emitter<'_> {
    fn bind(&mut self, value: Value) -> Token {
        self.params.push(value);
        Token::Param(self.params.len() - 1)
    }

    fn bind_date(&mut self, literal: DateLiteral, bound: DateBound, date_only: bool) -> (Token, usize) {
        let index = self.params.len();
        self.params.push(Value::Unresolved);
        self.date_params.push(DateParam {
            param_index: index,
            literal,
            is_range: false,
            end_index: None,
            bound,
            date_only,
        });
        (Token::Param(index), self.date_params.len() - 1)
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn statement(&mut self, frame: &Frame<'_>, role: &Role) -> SoqlResult<(TokenStream, Vec<String>)> {
        let query = &frame.query.query;
        let object = &frame.query.object;
        let mut ts = TokenStream::new();
        let mut columns = Vec::new();

        // SELECT
        ts.push(Token::Select).space();
        let mut unnamed = 0;
        for item in &query.select {
            for (expr, name) in self.select_item(frame, item, &mut unnamed)? {
                if !columns.is_empty() {
                    ts.comma().space();
                }
                ts.append(expr).keyword(Token::As).ident(name.clone());
                columns.push(name);
            }
        }

        // FROM
        ts.keyword(Token::From)
            .push(Token::Table {
                schema: object.schema.clone(),
                name: object.table.clone(),
            })
            .space()
            .ident(frame.scope.root_alias());
        for step in &frame.query.joins {
            self.join(frame, step, &mut ts);
        }

        // WHERE
        let filter = match &query.where_clause {
            Some(expr) => Some(self.expr(frame, expr)?),
            None => None,
        };
        match (role, filter) {
            (
                Role::Relationship {
                    parent_alias,
                    parent_id,
                    child_column,
                },
                filter,
            ) => {
                ts.keyword(Token::Where)
                    .column(frame.scope.root_alias(), child_column.clone())
                    .space()
                    .push(Token::Eq)
                    .space()
                    .column(parent_alias.clone(), parent_id.clone());
                if let Some(filter) = filter {
                    ts.keyword(Token::And).lparen().append(filter).rparen();
                }
            }
            (_, Some(filter)) => {
                ts.keyword(Token::Where).append(filter);
            }
            (_, None) => {}
        }

        // GROUP BY
        if !query.group_by.is_empty() {
            ts.keyword(Token::GroupBy);
            for (i, path) in query.group_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                let resolved = frame.resolve(path)?;
                ts.push(frame.column(resolved));
            }
        }

        // HAVING
        if let Some(having) = &query.having {
            let having = self.expr(frame, having)?;
            ts.keyword(Token::Having).append(having);
        }

        // ORDER BY
        if !query.order_by.is_empty() {
            ts.keyword(Token::OrderBy);
            for (i, item) in query.order_by.iter().enumerate() {
                if i > 0 {
                    ts.comma().space();
                }
                let expr = self.expr(frame, &item.expr)?;
                ts.append(expr).space().push(match item.direction {
                    SortDirection::Asc => Token::Asc,
                    SortDirection::Desc => Token::Desc,
                });
                match item.nulls {
                    Some(NullsOrder::First) => ts.space().push(Token::NullsFirst),
                    Some(NullsOrder::Last) => ts.space().push(Token::NullsLast),
                    None => &mut ts,
                };
            }
        }

        // LIMIT / OFFSET
        let limit = match role {
            Role::Root => self.limits.effective_limit(query.limit),
            Role::Relationship { .. } => self.limits.effective_subquery_limit(query.limit),
            Role::Filter => query.limit,
        };
        if let Some(limit) = limit {
            ts.keyword(Token::Limit).push(Token::LitInt(limit));
        }
        if let Some(offset) = query.offset {
            ts.keyword(Token::Offset).push(Token::LitInt(offset));
        }

        // FOR UPDATE locks the root table only; outer-joined tables cannot be locked.
        if query.for_update && matches!(role, Role::Root) {
            ts.space().push(Token::ForUpdate);
            if !frame.query.joins.is_empty() {
                ts.space().push(Token::Raw("OF")).space().ident(frame.scope.root_alias());
            }
        }

        Ok((ts, columns))
    }

    fn join(&mut self, frame: &Frame<'_>, step: &JoinStep, ts: &mut TokenStream) {
        let parent = frame.scope.parent_alias(step).to_string();
        let alias = frame.scope.join_alias(&step.key).to_string();
        ts.keyword(Token::LeftJoin)
            .push(Token::Table {
                schema: step.to_schema.clone(),
                name: step.to_table.clone(),
            })
            .space()
            .ident(alias.clone())
            .keyword(Token::On)
            .column(parent.clone(), step.fk_column.clone())
            .space()
            .push(Token::Eq)
            .space()
            .column(alias, step.to_id_column.clone());
        if let Some((type_column, object)) = &step.discriminator {
            let param = self.bind(Value::String(object.clone()));
            ts.keyword(Token::And)
                .column(parent, type_column.clone())
                .space()
                .push(Token::Eq)
                .space()
                .push(param);
        }
    }

    // ========================================================================
    // Select items
    // ========================================================================

    fn select_item(
        &mut self,
        frame: &Frame<'_>,
        item: &SelectItem,
        unnamed: &mut usize,
    ) -> SoqlResult<Vec<(TokenStream, String)>> {
        let mut expr_name = |alias: &Option<String>| {
            alias.clone().unwrap_or_else(|| {
                let name = format!("expr{}", *unnamed);
                *unnamed += 1;
                name
            })
        };

        match item {
            SelectItem::Field { path, alias } => {
                let resolved = frame.resolve(path)?;
                let mut ts = TokenStream::new();
                ts.push(frame.column(resolved));
                let name = alias.clone().unwrap_or_else(|| resolved.path.clone());
                Ok(vec![(ts, name)])
            }
            SelectItem::Aggregate { call, alias } => {
                let ts = self.aggregate(frame, call)?;
                Ok(vec![(ts, expr_name(alias))])
            }
            SelectItem::Function { call, alias } => {
                let ts = self.function(frame, call)?;
                Ok(vec![(ts, expr_name(alias))])
            }
            SelectItem::TypeOf(typeof_) => self.typeof_columns(frame, typeof_),
            SelectItem::Subquery(sub) => {
                let validated = frame.subquery(sub)?;
                let SubqueryKind::Relationship { name, child_column } = &validated.kind else {
                    return Err(internal("expected a relationship subquery", sub.position));
                };
                let n = self.subqueries;
                self.subqueries += 1;
                let child = Frame {
                    query: &validated.query,
                    scope: TableScope::subquery(&validated.query, n),
                };
                let role = Role::Relationship {
                    parent_alias: frame.scope.root_alias().to_string(),
                    parent_id: frame.query.object.id_column.clone(),
                    child_column: child_column.clone(),
                };
                let (inner, _) = self.statement(&child, &role)?;

                let mut ts = TokenStream::new();
                ts.lparen()
                    .push(Token::Select)
                    .space()
                    .push(Token::Raw("COALESCE(json_agg(row_to_json("))
                    .ident(ROWS_ALIAS)
                    .push(Token::Raw(")), '[]'::json)"))
                    .keyword(Token::From)
                    .lparen()
                    .append(inner)
                    .rparen()
                    .keyword(Token::As)
                    .ident(ROWS_ALIAS)
                    .rparen();
                Ok(vec![(ts, name.clone())])
            }
        }
    }

    /// One column per WHEN field, and one COALESCE per ELSE field.
    fn typeof_columns(
        &mut self,
        frame: &Frame<'_>,
        typeof_: &TypeOf,
    ) -> SoqlResult<Vec<(TokenStream, String)>> {
        let mut out = Vec::new();
        for branch in &typeof_.branches {
            for field in &branch.fields {
                let spelling = typeof_spelling(&typeof_.path, &branch.object, field);
                let resolved = frame.resolve_spelling(&spelling, field.position)?;
                let mut ts = TokenStream::new();
                ts.push(frame.column(resolved));
                out.push((ts, spelling));
            }
        }

        for field in &typeof_.else_fields {
            let spelling = format!("{}.{}", typeof_.path.dotted(), field.dotted());
            let refs = frame.query.fallback(&spelling);
            let mut ts = TokenStream::new();
            match refs.as_slice() {
                [] => return Err(unresolved(&spelling, field.position)),
                [only] => {
                    ts.push(frame.column(only));
                }
                many => {
                    ts.push(Token::FunctionName("COALESCE".into())).lparen();
                    for (i, resolved) in many.iter().enumerate() {
                        if i > 0 {
                            ts.comma().space();
                        }
                        ts.push(frame.column(resolved));
                    }
                    ts.rparen();
                }
            }
            out.push((ts, spelling));
        }
        Ok(out)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn expr(&mut self, frame: &Frame<'_>, expr: &Expr) -> SoqlResult<TokenStream> {
        let mut ts = TokenStream::new();
        match expr {
            Expr::Or(left, right) | Expr::And(left, right) => {
                let op = if matches!(expr, Expr::Or(..)) { Token::Or } else { Token::And };
                let left = self.expr(frame, left)?;
                let right = self.expr(frame, right)?;
                ts.append(left).keyword(op).append(right);
            }
            Expr::Not(inner) => {
                let inner = self.expr(frame, inner)?;
                ts.push(Token::Not).space().append(inner);
            }
            Expr::Compare { op, left, right } => {
                return self.compare(frame, *op, left, right);
            }
            Expr::In { expr: lhs, list, negated } => {
                return self.in_list(frame, lhs, list, *negated);
            }
            Expr::Like { expr: lhs, pattern, negated } => {
                let lhs = self.expr(frame, lhs)?;
                let pattern = self.expr(frame, pattern)?;
                ts.append(lhs).space();
                if *negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::Like).space().append(pattern);
            }
            Expr::IsNull { expr: inner, negated } => {
                let inner = self.expr(frame, inner)?;
                ts.append(inner)
                    .space()
                    .push(if *negated { Token::IsNotNull } else { Token::IsNull });
            }
            Expr::Arithmetic { op, left, right } => {
                let token = match op {
                    ArithmeticOp::Add => Token::Plus,
                    ArithmeticOp::Sub => Token::Minus,
                    ArithmeticOp::Concat => Token::Concat,
                    ArithmeticOp::Mul => Token::Mul,
                    ArithmeticOp::Div => Token::Div,
                    ArithmeticOp::Mod => Token::Mod,
                };
                let left = self.expr(frame, left)?;
                let right = self.expr(frame, right)?;
                ts.append(left).keyword(token).append(right);
            }
            Expr::Negate(inner) => {
                let inner = self.expr(frame, inner)?;
                ts.push(Token::Minus);
                // `--` opens a line comment in PostgreSQL.
                if inner.first() == Some(&Token::Minus) {
                    ts.space();
                }
                ts.append(inner);
            }
            Expr::Literal(literal, _) => {
                let token = match literal {
                    Literal::Null => Token::Null,
                    Literal::String(s) => self.bind(Value::String(s.clone())),
                    Literal::Integer(n) => self.bind(Value::Int(*n)),
                    Literal::Float(x) => self.bind(Value::Float(*x)),
                    Literal::Boolean(b) => self.bind(Value::Bool(*b)),
                };
                ts.push(token);
            }
            Expr::Date(value, _) => {
                let token = match value {
                    DateValue::Date(d) => self.bind(Value::Date(*d)),
                    DateValue::DateTime(dt) => self.bind(Value::Timestamp(dt.with_timezone(&Utc))),
                    DateValue::Relative(literal) => self.bind_date(*literal, DateBound::Start, false).0,
                };
                ts.push(token);
            }
            Expr::Field(path) => {
                let resolved = frame.resolve(path)?;
                ts.push(frame.column(resolved));
            }
            Expr::Function(call) => return self.function(frame, call),
            Expr::Aggregate(call) => return self.aggregate(frame, call),
            Expr::Paren(inner) => {
                let inner = self.expr(frame, inner)?;
                ts.lparen().append(inner).rparen();
            }
        }
        Ok(ts)
    }

    fn compare(
        &mut self,
        frame: &Frame<'_>,
        op: CompareOp,
        left: &Expr,
        right: &Expr,
    ) -> SoqlResult<TokenStream> {
        if let Some(literal) = relative(right) {
            return self.relative_compare(frame, left, op, literal);
        }
        if let Some(literal) = relative(left) {
            return self.relative_compare(frame, right, flip(op), literal);
        }

        let mut ts = TokenStream::new();
        let null_test = match op {
            CompareOp::Eq => Some(Token::IsNull),
            CompareOp::Ne => Some(Token::IsNotNull),
            _ => None,
        };
        if let Some(test) = null_test {
            let operand = if is_null(right) {
                Some(left)
            } else if is_null(left) {
                Some(right)
            } else {
                None
            };
            if let Some(operand) = operand {
                let operand = self.expr(frame, operand)?;
                ts.append(operand).space().push(test);
                return Ok(ts);
            }
        }

        let left = self.expr(frame, left)?;
        let right = self.expr(frame, right)?;
        ts.append(left).keyword(compare_token(op)).append(right);
        Ok(ts)
    }

    /// `operand <op> <relative date>`.
    fn relative_compare(
        &mut self,
        frame: &Frame<'_>,
        operand: &Expr,
        op: CompareOp,
        literal: DateLiteral,
    ) -> SoqlResult<TokenStream> {
        let date_only = self.is_date_only(frame, operand);
        let mut ts = TokenStream::new();

        let (low, joiner, high) = match op {
            CompareOp::Eq => (Token::Gte, Token::And, Token::Lte),
            CompareOp::Ne => (Token::Lt, Token::Or, Token::Gt),
            point => {
                let bound = match point {
                    CompareOp::Lt | CompareOp::Gte => DateBound::Start,
                    _ => DateBound::End,
                };
                let operand = self.expr(frame, operand)?;
                let (param, _) = self.bind_date(literal, bound, date_only);
                ts.append(operand).keyword(compare_token(point)).push(param);
                return Ok(ts);
            }
        };

        let first = self.expr(frame, operand)?;
        let (start, record) = self.bind_date(literal, DateBound::Start, date_only);
        let second = self.expr(frame, operand)?;
        let end_index = self.params.len();
        self.params.push(Value::Unresolved);
        let range = &mut self.date_params[record];
        range.is_range = true;
        range.end_index = Some(end_index);

        ts.lparen()
            .append(first)
            .keyword(low)
            .push(start)
            .keyword(joiner)
            .append(second)
            .keyword(high)
            .param(end_index)
            .rparen();
        Ok(ts)
    }

    fn in_list(
        &mut self,
        frame: &Frame<'_>,
        lhs: &Expr,
        list: &InList,
        negated: bool,
    ) -> SoqlResult<TokenStream> {
        let mut ts = TokenStream::new();
        match list {
            InList::Values(values) if values.iter().any(|v| relative(v).is_some()) => {
                // Relative dates cover ranges, so IN becomes an OR of equalities.
                if negated {
                    ts.push(Token::Not).space();
                }
                ts.lparen();
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        ts.keyword(Token::Or);
                    }
                    let part = self.compare(frame, CompareOp::Eq, lhs, value)?;
                    ts.append(part);
                }
                ts.rparen();
            }
            InList::Values(values) => {
                let lhs = self.expr(frame, lhs)?;
                ts.append(lhs).space();
                if negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::In).space().lparen();
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    let value = self.expr(frame, value)?;
                    ts.append(value);
                }
                ts.rparen();
            }
            InList::Subquery(sub) => {
                let lhs = self.expr(frame, lhs)?;
                let validated = frame.subquery(sub)?;
                let n = self.subqueries;
                self.subqueries += 1;
                let child = Frame {
                    query: &validated.query,
                    scope: TableScope::subquery(&validated.query, n),
                };
                let (inner, _) = self.statement(&child, &Role::Filter)?;

                ts.append(lhs).space();
                if negated {
                    ts.push(Token::Not).space();
                }
                ts.push(Token::In).space().lparen().append(inner).rparen();
            }
        }
        Ok(ts)
    }

    fn function(&mut self, frame: &Frame<'_>, call: &FunctionCall) -> SoqlResult<TokenStream> {
        let sig = lookup_function(&call.name)
            .ok_or_else(|| internal(&format!("unknown function {}", call.name), call.position))?;
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.expr(frame, arg)?);
        }

        let mut ts = TokenStream::new();
        match sig.sql {
            SqlForm::Call(name) => {
                ts.push(Token::FunctionName(name.to_string())).lparen();
                for (i, arg) in args.into_iter().enumerate() {
                    if i > 0 {
                        ts.comma().space();
                    }
                    ts.append(arg);
                }
                ts.rparen();
            }
            SqlForm::Extract(field) => {
                ts.push(Token::FunctionName("EXTRACT".into()))
                    .lparen()
                    .push(Token::Raw(field))
                    .keyword(Token::From);
                for arg in args {
                    ts.append(arg);
                }
                ts.rparen();
            }
            SqlForm::CastDate => {
                ts.push(Token::FunctionName("CAST".into())).lparen();
                for arg in args {
                    ts.append(arg);
                }
                ts.keyword(Token::As).push(Token::Raw("DATE")).rparen();
            }
        }
        Ok(ts)
    }

    fn aggregate(&mut self, frame: &Frame<'_>, call: &AggregateCall) -> SoqlResult<TokenStream> {
        let name = match call.function {
            AggregateFunction::Count | AggregateFunction::CountDistinct => "COUNT",
            other => other.name(),
        };
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName(name.into())).lparen();
        match &call.arg {
            None => {
                ts.push(Token::Star);
            }
            Some(arg) => {
                if call.distinct || call.function == AggregateFunction::CountDistinct {
                    ts.push(Token::Distinct).space();
                }
                let arg = self.expr(frame, arg)?;
                ts.append(arg);
            }
        }
        ts.rparen();
        Ok(ts)
    }

    /// Whether an operand holds calendar days rather than instants.
    fn is_date_only(&self, frame: &Frame<'_>, expr: &Expr) -> bool {
        match expr {
            Expr::Paren(inner) => self.is_date_only(frame, inner),
            Expr::Field(path) => frame
                .resolve(path)
                .map(|r| r.field.field_type == FieldType::Date)
                .unwrap_or(false),
            Expr::Function(call) => call.name.eq_ignore_ascii_case("DAY_ONLY"),
            _ => false,
        }
    }
}

fn relative(expr: &Expr) -> Option<DateLiteral> {
    match expr {
        Expr::Paren(inner) => relative(inner),
        Expr::Date(DateValue::Relative(literal), _) => Some(*literal),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    match expr {
        Expr::Paren(inner) => is_null(inner),
        Expr::Literal(Literal::Null, _) => true,
        _ => false,
    }
}

/// The operator that keeps `a op b` equal to `b flip(op) a`.
fn flip(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::Lte => CompareOp::Gte,
        CompareOp::Gte => CompareOp::Lte,
        same => same,
    }
}

fn compare_token(op: CompareOp) -> Token {
    match op {
        CompareOp::Eq => Token::Eq,
        CompareOp::Ne => Token::Ne,
        CompareOp::Lt => Token::Lt,
        CompareOp::Lte => Token::Lte,
        CompareOp::Gt => Token::Gt,
        CompareOp::Gte => Token::Gte,
    }
}

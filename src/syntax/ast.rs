//! AST node types for SOQL queries.
//!
//! Nodes are immutable once parsed. Field paths, calls, literals and
//! subqueries carry the [`Position`] they were parsed from so later stages can
//! report errors against the source text.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::dates::DateLiteral;
use crate::syntax::span::Position;

// ============================================================================
// Query (Root)
// ============================================================================

/// A complete SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub select: Vec<SelectItem>,
    pub from: FromClause,
    pub where_clause: Option<Expr>,
    pub with_security_enforced: bool,
    pub group_by: Vec<FieldPath>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub for_update: bool,
    /// Position of the `SELECT` keyword.
    pub position: Position,
}

impl Query {
    /// Whether any select item is an aggregate, or the query is grouped.
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty()
            || self
                .select
                .iter()
                .any(|item| matches!(item, SelectItem::Aggregate { .. }))
    }
}

/// The FROM clause: an object name (or relationship name in a subquery).
#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    pub name: String,
    pub alias: Option<String>,
    pub position: Position,
}

// ============================================================================
// Select items
// ============================================================================

/// One entry in the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `Account.Owner.Name [alias]`
    Field {
        path: FieldPath,
        alias: Option<String>,
    },
    /// `COUNT(Id) [alias]`
    Aggregate {
        call: AggregateCall,
        alias: Option<String>,
    },
    /// `UPPER(Name) [alias]`
    Function {
        call: FunctionCall,
        alias: Option<String>,
    },
    /// `TYPEOF What WHEN Account THEN Name ... END`
    TypeOf(TypeOf),
    /// `(SELECT LastName FROM Contacts)`
    Subquery(Box<Query>),
}

impl SelectItem {
    /// Number of leaf columns this item contributes.
    pub fn leaf_count(&self) -> usize {
        match self {
            SelectItem::Field { .. }
            | SelectItem::Aggregate { .. }
            | SelectItem::Function { .. } => 1,
            SelectItem::TypeOf(t) => {
                t.branches.iter().map(|b| b.fields.len()).sum::<usize>() + t.else_fields.len()
            }
            SelectItem::Subquery(q) => q.select.iter().map(SelectItem::leaf_count).sum(),
        }
    }
}

/// Polymorphic lookup selection.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeOf {
    pub path: FieldPath,
    pub branches: Vec<TypeOfBranch>,
    pub else_fields: Vec<FieldPath>,
    pub position: Position,
}

/// `WHEN <object> THEN <fields>`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeOfBranch {
    pub object: String,
    pub fields: Vec<FieldPath>,
    pub position: Position,
}

// ============================================================================
// ORDER BY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub direction: SortDirection,
    pub nulls: Option<NullsOrder>,
}

// ============================================================================
// Expressions
// ============================================================================

/// A filter or value expression.
///
/// The parser encodes operator precedence in the tree shape, from loosest to
/// tightest: OR, AND, NOT, comparison, IN, LIKE, IS, additive, multiplicative,
/// unary, primary.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    In {
        expr: Box<Expr>,
        list: InList,
        negated: bool,
    },
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    Literal(Literal, Position),
    Date(DateValue, Position),
    Field(FieldPath),
    Function(FunctionCall),
    Aggregate(AggregateCall),
    Paren(Box<Expr>),
}

impl Expr {
    /// Position of the leftmost token of this expression.
    pub fn position(&self) -> Position {
        match self {
            Expr::Or(l, _) | Expr::And(l, _) => l.position(),
            Expr::Not(e) | Expr::Negate(e) | Expr::Paren(e) => e.position(),
            Expr::Compare { left, .. } | Expr::Arithmetic { left, .. } => left.position(),
            Expr::In { expr, .. } | Expr::Like { expr, .. } | Expr::IsNull { expr, .. } => {
                expr.position()
            }
            Expr::Literal(_, pos) | Expr::Date(_, pos) => *pos,
            Expr::Field(path) => path.position,
            Expr::Function(call) => call.position,
            Expr::Aggregate(call) => call.position,
        }
    }

    /// Whether an aggregate call appears anywhere in this expression.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate(_) => true,
            Expr::Or(l, r) | Expr::And(l, r) => l.contains_aggregate() || r.contains_aggregate(),
            Expr::Compare { left, right, .. } | Expr::Arithmetic { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::Not(e) | Expr::Negate(e) | Expr::Paren(e) => e.contains_aggregate(),
            Expr::In { expr, list, .. } => {
                expr.contains_aggregate()
                    || matches!(list, InList::Values(values) if values.iter().any(Expr::contains_aggregate))
            }
            Expr::Like { expr, pattern, .. } => {
                expr.contains_aggregate() || pattern.contains_aggregate()
            }
            Expr::IsNull { expr, .. } => expr.contains_aggregate(),
            Expr::Function(call) => call.args.iter().any(Expr::contains_aggregate),
            Expr::Literal(..) | Expr::Date(..) | Expr::Field(_) => false,
        }
    }
}

/// Right-hand side of an IN expression.
#[derive(Debug, Clone, PartialEq)]
pub enum InList {
    Values(Vec<Expr>),
    Subquery(Box<Query>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Concat,
    Mul,
    Div,
    Mod,
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Concat => "||",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Mod => "%",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Literals
// ============================================================================

/// A constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

/// Semantic type of a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Null,
}

impl Literal {
    pub fn literal_type(&self) -> LiteralType {
        match self {
            Literal::String(_) => LiteralType::String,
            Literal::Integer(_) => LiteralType::Integer,
            Literal::Float(_) => LiteralType::Float,
            Literal::Boolean(_) => LiteralType::Boolean,
            Literal::Null => LiteralType::Null,
        }
    }
}

/// A date-valued constant.
#[derive(Debug, Clone, PartialEq)]
pub enum DateValue {
    /// `2024-03-15`
    Date(NaiveDate),
    /// `2024-03-15T10:00:00Z`
    DateTime(DateTime<FixedOffset>),
    /// `TODAY`, `LAST_N_DAYS:30`, ...
    Relative(DateLiteral),
}

impl DateValue {
    pub fn literal_type(&self) -> LiteralType {
        match self {
            DateValue::DateTime(_) => LiteralType::DateTime,
            DateValue::Date(_) | DateValue::Relative(_) => LiteralType::Date,
        }
    }
}

// ============================================================================
// Field paths and calls
// ============================================================================

/// A dotted field reference such as `Account.Owner.Name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub segments: Vec<String>,
    pub position: Position,
}

impl FieldPath {
    pub fn new(segments: Vec<String>, position: Position) -> Self {
        Self { segments, position }
    }

    /// The path as written, e.g. `Account.Owner.Name`.
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }

    /// The terminal (field) segment.
    pub fn field(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The lookup segments leading to the terminal field.
    pub fn lookups(&self) -> &[String] {
        &self.segments[..self.segments.len().saturating_sub(1)]
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted())
    }
}

/// A scalar function call.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Upper-cased function name.
    pub name: String,
    pub args: Vec<Expr>,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(AggregateFunction::Count),
            "COUNT_DISTINCT" => Some(AggregateFunction::CountDistinct),
            "SUM" => Some(AggregateFunction::Sum),
            "AVG" => Some(AggregateFunction::Avg),
            "MIN" => Some(AggregateFunction::Min),
            "MAX" => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::CountDistinct => "COUNT_DISTINCT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
        }
    }
}

/// An aggregate call. `arg` is `None` for `COUNT()`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub function: AggregateFunction,
    pub arg: Option<Box<Expr>>,
    pub distinct: bool,
    pub position: Position,
}

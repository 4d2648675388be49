//! Scalar function signatures.

use super::types::ExprType;

/// Accepted type of a function argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Any,
    Text,
    Number,
    /// Date or datetime.
    Temporal,
    DateTime,
}

impl ArgKind {
    pub fn accepts(self, ty: ExprType) -> bool {
        ty == ExprType::Null
            || match self {
                ArgKind::Any => true,
                ArgKind::Text => ty == ExprType::Text,
                ArgKind::Number => ty == ExprType::Number,
                ArgKind::Temporal => ty.is_temporal(),
                ArgKind::DateTime => ty == ExprType::DateTime,
            }
    }
}

/// Result type of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    Fixed(ExprType),
    /// Type of the first non-null argument.
    FirstArg,
}

/// Signature of a scalar function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSig {
    pub name: &'static str,
    pub min_args: usize,
    /// `None` for variadic functions.
    pub max_args: Option<usize>,
    pub args: &'static [ArgKind],
    /// Kind applied to arguments beyond `args`.
    pub rest: ArgKind,
    pub returns: Returns,
    pub sql: SqlForm,
}

/// How a call is rendered in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlForm {
    /// `NAME(args)`
    Call(&'static str),
    /// `EXTRACT(FIELD FROM arg)`
    Extract(&'static str),
    /// `CAST(arg AS DATE)`
    CastDate,
}

impl FunctionSig {
    pub fn arg_kind(&self, index: usize) -> ArgKind {
        self.args.get(index).copied().unwrap_or(self.rest)
    }

    pub fn accepts_arity(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }
}

const fn sig(
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    args: &'static [ArgKind],
    rest: ArgKind,
    returns: Returns,
    sql: SqlForm,
) -> FunctionSig {
    FunctionSig {
        name,
        min_args,
        max_args,
        args,
        rest,
        returns,
        sql,
    }
}

use ArgKind::*;
use ExprType as T;

static FUNCTIONS: &[FunctionSig] = &[
    sig("COALESCE", 1, None, &[], Any, Returns::FirstArg, SqlForm::Call("COALESCE")),
    sig("UPPER", 1, Some(1), &[Text], Text, Returns::Fixed(T::Text), SqlForm::Call("UPPER")),
    sig("LOWER", 1, Some(1), &[Text], Text, Returns::Fixed(T::Text), SqlForm::Call("LOWER")),
    sig("TRIM", 1, Some(1), &[Text], Text, Returns::Fixed(T::Text), SqlForm::Call("TRIM")),
    sig("LENGTH", 1, Some(1), &[Text], Text, Returns::Fixed(T::Number), SqlForm::Call("LENGTH")),
    sig("SUBSTRING", 2, Some(3), &[Text, Number, Number], Number, Returns::Fixed(T::Text), SqlForm::Call("SUBSTR")),
    sig("ROUND", 1, Some(2), &[Number, Number], Number, Returns::Fixed(T::Number), SqlForm::Call("ROUND")),
    sig("ABS", 1, Some(1), &[Number], Number, Returns::Fixed(T::Number), SqlForm::Call("ABS")),
    sig("CONCAT", 1, None, &[], Any, Returns::Fixed(T::Text), SqlForm::Call("CONCAT")),
    sig("NULLIF", 2, Some(2), &[Any, Any], Any, Returns::FirstArg, SqlForm::Call("NULLIF")),
    sig("CALENDAR_YEAR", 1, Some(1), &[Temporal], Temporal, Returns::Fixed(T::Number), SqlForm::Extract("YEAR")),
    sig("CALENDAR_MONTH", 1, Some(1), &[Temporal], Temporal, Returns::Fixed(T::Number), SqlForm::Extract("MONTH")),
    sig("CALENDAR_QUARTER", 1, Some(1), &[Temporal], Temporal, Returns::Fixed(T::Number), SqlForm::Extract("QUARTER")),
    sig("DAY_IN_MONTH", 1, Some(1), &[Temporal], Temporal, Returns::Fixed(T::Number), SqlForm::Extract("DAY")),
    sig("DAY_ONLY", 1, Some(1), &[DateTime], DateTime, Returns::Fixed(T::Date), SqlForm::CastDate),
];

/// Look up a function by (case-insensitive) name.
pub fn lookup(name: &str) -> Option<&'static FunctionSig> {
    FUNCTIONS.iter().find(|f| f.name.eq_ignore_ascii_case(name))
}

/// Names of all supported scalar functions.
pub fn names() -> impl Iterator<Item = &'static str> {
    FUNCTIONS.iter().map(|f| f.name)
}

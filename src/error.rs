//! Error taxonomy for the query engine.
//!
//! Every stage returns the first error it encounters as a single
//! [`SoqlError`]. Callers match on the variant for structured details; the
//! `Display` output is always available as a fallback message.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::syntax::span::Position;

/// Result type for engine operations.
pub type SoqlResult<T> = Result<T, SoqlError>;

/// Broad category of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Parse,
    Validation,
    Access,
    Limit,
    Execution,
    Cancelled,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Parse => "parse",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Access => "access",
            ErrorCategory::Limit => "limit",
            ErrorCategory::Execution => "execution",
            ErrorCategory::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Any error the engine can produce.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SoqlError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Limit(#[from] LimitError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("query cancelled")]
    Cancelled,
}

impl SoqlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SoqlError::Parse(_) => ErrorCategory::Parse,
            SoqlError::Validation(_) => ErrorCategory::Validation,
            SoqlError::Access(_) => ErrorCategory::Access,
            SoqlError::Limit(_) => ErrorCategory::Limit,
            SoqlError::Execution(_) => ErrorCategory::Execution,
            SoqlError::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Source position, when the error can be tied to one.
    pub fn position(&self) -> Option<Position> {
        match self {
            SoqlError::Parse(e) => Some(e.position),
            SoqlError::Validation(e) => e.position,
            SoqlError::Access(e) => e.position,
            SoqlError::Limit(e) => e.position,
            SoqlError::Execution(_) | SoqlError::Cancelled => None,
        }
    }

    /// Machine-readable error code, e.g. `UNKNOWN_FIELD` or `MAX_RECORDS`.
    pub fn code(&self) -> &'static str {
        match self {
            SoqlError::Parse(_) => "PARSE_ERROR",
            SoqlError::Validation(e) => e.code.as_str(),
            SoqlError::Access(_) => "ACCESS_DENIED",
            SoqlError::Limit(e) => e.kind.as_str(),
            SoqlError::Execution(_) => "EXECUTION_ERROR",
            SoqlError::Cancelled => "CANCELLED",
        }
    }

    /// The message without any position prefix.
    pub fn message(&self) -> String {
        match self {
            SoqlError::Parse(e) => e.message.clone(),
            SoqlError::Validation(e) => e.message.clone(),
            other => other.to_string(),
        }
    }

    pub fn validation_code(&self) -> Option<ValidationCode> {
        match self {
            SoqlError::Validation(e) => Some(e.code),
            _ => None,
        }
    }
}

// ============================================================================
// Parse errors
// ============================================================================

/// A syntax error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("syntax error at {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: Position,
    /// The grammar alternative that was expected.
    pub expected: String,
    /// The token that was found instead.
    pub got: String,
}

impl ParseError {
    pub fn new(position: Position, expected: impl Into<String>, got: impl Into<String>) -> Self {
        let expected = expected.into();
        let got = got.into();
        Self {
            message: format!("expected {}, got {}", expected, got),
            position,
            expected,
            got,
        }
    }
}

// ============================================================================
// Validation errors
// ============================================================================

/// Semantic validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    UnknownObject,
    UnknownField,
    UnknownLookup,
    UnknownRelationship,
    UnknownFunction,
    TypeMismatch,
    FieldNotFilterable,
    FieldNotSortable,
    FieldNotGroupable,
    FieldNotAggregatable,
    FieldNotGrouped,
    NestedSubqueryNotAllowed,
    TooManyLookupLevels,
    InvalidExpression,
    MissingRequiredClause,
    InvalidDateLiteral,
    InvalidPagination,
    WhereSubquerySingleField,
    WhereSubqueryAggregateField,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::UnknownObject => "UNKNOWN_OBJECT",
            ValidationCode::UnknownField => "UNKNOWN_FIELD",
            ValidationCode::UnknownLookup => "UNKNOWN_LOOKUP",
            ValidationCode::UnknownRelationship => "UNKNOWN_RELATIONSHIP",
            ValidationCode::UnknownFunction => "UNKNOWN_FUNCTION",
            ValidationCode::TypeMismatch => "TYPE_MISMATCH",
            ValidationCode::FieldNotFilterable => "FIELD_NOT_FILTERABLE",
            ValidationCode::FieldNotSortable => "FIELD_NOT_SORTABLE",
            ValidationCode::FieldNotGroupable => "FIELD_NOT_GROUPABLE",
            ValidationCode::FieldNotAggregatable => "FIELD_NOT_AGGREGATABLE",
            ValidationCode::FieldNotGrouped => "FIELD_NOT_GROUPED",
            ValidationCode::NestedSubqueryNotAllowed => "NESTED_SUBQUERY_NOT_ALLOWED",
            ValidationCode::TooManyLookupLevels => "TOO_MANY_LOOKUP_LEVELS",
            ValidationCode::InvalidExpression => "INVALID_EXPRESSION",
            ValidationCode::MissingRequiredClause => "MISSING_REQUIRED_CLAUSE",
            ValidationCode::InvalidDateLiteral => "INVALID_DATE_LITERAL",
            ValidationCode::InvalidPagination => "INVALID_PAGINATION",
            ValidationCode::WhereSubquerySingleField => "WHERE_SUBQUERY_SINGLE_FIELD",
            ValidationCode::WhereSubqueryAggregateField => "WHERE_SUBQUERY_AGGREGATE_FIELD",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A semantic error found while checking a query against metadata.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: String,
    pub object: Option<String>,
    pub field: Option<String>,
    pub position: Option<Position>,
}

impl ValidationError {
    pub fn new(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            object: None,
            field: None,
            position: None,
        }
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

// ============================================================================
// Access errors
// ============================================================================

/// Object or field access was denied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct AccessError {
    pub object: String,
    pub field: Option<String>,
    /// Explanation supplied by the controller, if any.
    pub reason: Option<String>,
    pub position: Option<Position>,
}

impl AccessError {
    pub fn object(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            field: None,
            reason: None,
            position: None,
        }
    }

    pub fn field(object: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            field: Some(field.into()),
            reason: None,
            position: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "access denied to field {}.{}", self.object, field)?,
            None => write!(f, "access denied to object {}", self.object)?,
        }
        match &self.reason {
            Some(reason) => write!(f, ": {}", reason),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Limit errors
// ============================================================================

/// The configured limit that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitKind {
    MaxSelectFields,
    MaxRecords,
    MaxOffset,
    MaxLookupDepth,
    MaxSubqueries,
    MaxSubqueryRecords,
    MaxQueryLength,
    MaxGroupByFields,
    MaxOrderByFields,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::MaxSelectFields => "MAX_SELECT_FIELDS",
            LimitKind::MaxRecords => "MAX_RECORDS",
            LimitKind::MaxOffset => "MAX_OFFSET",
            LimitKind::MaxLookupDepth => "MAX_LOOKUP_DEPTH",
            LimitKind::MaxSubqueries => "MAX_SUBQUERIES",
            LimitKind::MaxSubqueryRecords => "MAX_SUBQUERY_RECORDS",
            LimitKind::MaxQueryLength => "MAX_QUERY_LENGTH",
            LimitKind::MaxGroupByFields => "MAX_GROUP_BY_FIELDS",
            LimitKind::MaxOrderByFields => "MAX_ORDER_BY_FIELDS",
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource limit was exceeded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} exceeded: limit is {limit}, got {actual}")]
pub struct LimitError {
    pub kind: LimitKind,
    pub limit: u64,
    pub actual: u64,
    pub position: Option<Position>,
}

impl LimitError {
    pub fn new(kind: LimitKind, limit: u64, actual: u64) -> Self {
        Self {
            kind,
            limit,
            actual,
            position: None,
        }
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }
}

// ============================================================================
// Execution errors
// ============================================================================

/// A failure reported by the SQL layer that ran a compiled query.
#[derive(Debug, Clone, thiserror::Error)]
#[error("execution failed: {message}")]
pub struct ExecutionError {
    pub sql: String,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ExecutionError {
    pub fn new(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn from_driver<E>(sql: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            sql: sql.into(),
            message: err.to_string(),
            source: Some(Arc::new(err)),
        }
    }
}

//! Expression types used for type checking.

use std::fmt;

use crate::metadata::FieldType;
use crate::syntax::ast::LiteralType;

/// Inferred type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    Text,
    Number,
    Boolean,
    Date,
    DateTime,
    Null,
}

impl ExprType {
    pub fn is_temporal(self) -> bool {
        matches!(self, ExprType::Date | ExprType::DateTime)
    }

    /// Whether two operands may be compared or combined.
    pub fn compatible(self, other: ExprType) -> bool {
        self == other
            || self == ExprType::Null
            || other == ExprType::Null
            || (self.is_temporal() && other.is_temporal())
    }
}

impl From<FieldType> for ExprType {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Id | FieldType::String | FieldType::Picklist | FieldType::Reference => {
                ExprType::Text
            }
            FieldType::Integer | FieldType::Float | FieldType::Currency => ExprType::Number,
            FieldType::Boolean => ExprType::Boolean,
            FieldType::Date => ExprType::Date,
            FieldType::DateTime => ExprType::DateTime,
        }
    }
}

impl From<LiteralType> for ExprType {
    fn from(literal: LiteralType) -> Self {
        match literal {
            LiteralType::String => ExprType::Text,
            LiteralType::Integer | LiteralType::Float => ExprType::Number,
            LiteralType::Boolean => ExprType::Boolean,
            LiteralType::Date => ExprType::Date,
            LiteralType::DateTime => ExprType::DateTime,
            LiteralType::Null => ExprType::Null,
        }
    }
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExprType::Text => "text",
            ExprType::Number => "number",
            ExprType::Boolean => "boolean",
            ExprType::Date => "date",
            ExprType::DateTime => "datetime",
            ExprType::Null => "null",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility() {
        assert!(ExprType::Text.compatible(ExprType::Null));
        assert!(ExprType::Date.compatible(ExprType::DateTime));
        assert!(!ExprType::Text.compatible(ExprType::Number));
        assert_eq!(ExprType::from(FieldType::Currency), ExprType::Number);
    }
}

//! Output of compilation.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;

use crate::dates::DateLiteral;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$(\d+)").unwrap());

/// A bind parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    /// A relative date that has not been resolved against a clock yet.
    Unresolved,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Date(d) => write!(f, "{}", d),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Unresolved => f.write_str("<unresolved>"),
        }
    }
}

/// Which end of a date range a single placeholder takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    Start,
    End,
}

/// A placeholder standing in for a relative date literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateParam {
    /// 0-based index into `params`. The SQL placeholder is `$param_index+1`.
    pub param_index: usize,
    pub literal: DateLiteral,
    /// Whether the placeholder pair covers both ends of the range.
    pub is_range: bool,
    /// Index of the end placeholder when `is_range`.
    pub end_index: Option<usize>,
    /// Bound used when not a range.
    pub bound: DateBound,
    /// Bind calendar days instead of instants (the compared field is a date).
    pub date_only: bool,
}

/// A compiled, parameterized statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub date_params: Vec<DateParam>,
    /// Output column names, in select order.
    pub columns: Vec<String>,
}

impl CompiledQuery {
    /// Whether any relative date placeholder still needs resolving.
    pub fn has_unresolved(&self) -> bool {
        self.params.iter().any(|p| matches!(p, Value::Unresolved))
    }

    /// Distinct `$n` placeholders appearing in the SQL text.
    pub fn placeholders(&self) -> BTreeSet<usize> {
        PLACEHOLDER
            .captures_iter(&self.sql)
            .filter_map(|c| c[1].parse().ok())
            .collect()
    }

    /// Check that placeholders and date parameters agree with `params`.
    pub fn check_invariants(&self) -> Result<(), String> {
        let placeholders = self.placeholders();
        let expected: BTreeSet<usize> = (1..=self.params.len()).collect();
        if placeholders != expected {
            return Err(format!(
                "SQL uses placeholders {:?} but {} params are bound",
                placeholders,
                self.params.len()
            ));
        }

        for param in &self.date_params {
            if param.param_index >= self.params.len() {
                return Err(format!(
                    "date parameter for {} points past the params ({})",
                    param.literal, param.param_index
                ));
            }
            match (param.is_range, param.end_index) {
                (true, Some(end)) if end < self.params.len() => {}
                (true, _) => {
                    return Err(format!(
                        "range parameter for {} has no valid end index",
                        param.literal
                    ))
                }
                (false, Some(_)) => {
                    return Err(format!(
                        "point parameter for {} has an end index",
                        param.literal
                    ))
                }
                (false, None) => {}
            }
        }
        Ok(())
    }
}

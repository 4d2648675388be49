//! Serializable validation results for editors and admin tooling.

use serde::Serialize;

use crate::error::SoqlError;

/// Outcome of validating a query without compiling it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ReportedError>,
}

/// One problem, positioned when possible. `line` and `column` are 1-based;
/// both are 0 when the error has no position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub code: String,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_error(err: &SoqlError) -> Self {
        let (line, column) = err
            .position()
            .map(|p| (p.line, p.column))
            .unwrap_or((0, 0));
        Self {
            valid: false,
            errors: vec![ReportedError {
                message: err.message(),
                line,
                column,
                code: err.code().to_string(),
            }],
        }
    }

    pub fn from_result<T>(result: &Result<T, SoqlError>) -> Self {
        match result {
            Ok(_) => Self::valid(),
            Err(err) => Self::from_error(err),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

//! Structured validation findings.
//!
//! Schema validation, request validation, response validation and document
//! validation all report through [`ValidationError`] entries grouped in
//! [`ValidationResults`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Machine-readable code (e.g. `INVALID_TYPE`, `REQUIRED`).
    pub code: String,
    /// JSON path (or document path) where the problem was found.
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

impl ValidationError {
    /// Creates a new finding.
    pub fn new(
        code: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.code, self.path, self.message)
    }
}

/// Errors and warnings produced by one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResults {
    /// Findings that make the validated value invalid.
    #[serde(default)]
    pub errors: Vec<ValidationError>,
    /// Findings worth reporting that do not invalidate the value.
    #[serde(default)]
    pub warnings: Vec<ValidationError>,
}

impl ValidationResults {
    /// Creates an empty result set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error.
    pub fn error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Records a warning.
    pub fn warning(&mut self, warning: ValidationError) {
        self.warnings.push(warning);
    }

    /// Returns true when neither errors nor warnings were recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// Returns true when at least one error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

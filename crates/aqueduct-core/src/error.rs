//! Error types for Aqueduct.
//!
//! Two families of errors exist:
//!
//! - [`PipeError`] is scoped to one request. It travels through a pipe,
//!   may be recovered by an error-handling fitting, and is otherwise
//!   surfaced to the HTTP layer together with its status code, code and
//!   validation entries.
//! - [`SetupError`] is raised while the runner is being assembled (fitting
//!   construction, pipe resolution, specification validation). A runner that
//!   failed setup never accepts traffic.
//!
//! # Categories
//!
//! | `ErrorCategory` | Default status | Default code |
//! |---|---|---|
//! | `Routing` | 405 | `METHOD_NOT_ALLOWED` |
//! | `Authorization` | 403 | `server_error` |
//! | `Validation` | 400 | `VALIDATION_ERROR` |
//! | `Configuration` | 500 | `CONFIGURATION_ERROR` |
//! | `Controller` | 500 | `CONTROLLER_ERROR` |
//! | `Internal` | 500 | `INTERNAL_ERROR` |

use crate::validation::ValidationError;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`PipeError`].
pub type PipeResult<T> = Result<T, PipeError>;

/// Categories of per-request errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// No operation or pipe can serve the request.
    Routing,
    /// A security requirement denied the request.
    Authorization,
    /// Request schema violations.
    Validation,
    /// The runner is misconfigured for this request (unknown security
    /// scheme, unsupported upload, missing controller handler).
    Configuration,
    /// A controller failed or returned an error.
    Controller,
    /// Anything else, including failures while finalizing the response.
    Internal,
}

impl ErrorCategory {
    /// Returns the HTTP status used when the error carries no explicit status.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Routing => StatusCode::METHOD_NOT_ALLOWED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Configuration | Self::Controller | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the category name as serialized.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Routing => "routing",
            Self::Authorization => "authorization",
            Self::Validation => "validation",
            Self::Configuration => "configuration",
            Self::Controller => "controller",
            Self::Internal => "internal",
        }
    }

    /// Returns the machine-readable code used when the error carries none.
    #[must_use]
    pub const fn default_code(&self) -> &'static str {
        match self {
            Self::Routing => "METHOD_NOT_ALLOWED",
            Self::Authorization => "server_error",
            Self::Validation => "VALIDATION_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Controller => "CONTROLLER_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

/// A per-request error.
///
/// # Example
///
/// ```
/// use aqueduct_core::{ErrorCategory, PipeError};
/// use http::StatusCode;
///
/// let err = PipeError::authorization("token expired").with_code("invalid_token");
/// assert_eq!(err.category(), ErrorCategory::Authorization);
/// assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
/// assert_eq!(err.code(), Some("invalid_token"));
/// ```
#[derive(Error, Debug)]
#[error("{message}")]
pub struct PipeError {
    category: ErrorCategory,
    message: String,
    status: Option<StatusCode>,
    code: Option<String>,
    headers: HeaderMap,
    validation_errors: Vec<ValidationError>,
    allowed_methods: Vec<String>,
    #[source]
    source: Option<anyhow::Error>,
}

impl PipeError {
    /// Creates an error of the given category with no explicit status.
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            status: None,
            code: None,
            headers: HeaderMap::new(),
            validation_errors: Vec::new(),
            allowed_methods: Vec::new(),
            source: None,
        }
    }

    /// Creates a routing error (HTTP 405).
    #[must_use]
    pub fn routing(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Routing, message).with_status(StatusCode::METHOD_NOT_ALLOWED)
    }

    /// Creates an authorization error.
    ///
    /// The status is left unset so the security fitting can apply its
    /// default of 403.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Authorization, message)
    }

    /// Creates a request validation error (HTTP 400).
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, message).with_status(StatusCode::BAD_REQUEST)
    }

    /// Creates a request validation error carrying structured entries.
    #[must_use]
    pub fn validation_with_errors(
        message: impl Into<String>,
        errors: Vec<ValidationError>,
    ) -> Self {
        let mut err = Self::validation(message);
        err.validation_errors = errors;
        err
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Configuration, message)
    }

    /// Creates a controller error.
    #[must_use]
    pub fn controller(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Controller, message)
    }

    /// Creates a controller error wrapping the controller's own failure.
    pub fn controller_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        let mut err = Self::controller(message);
        err.source = Some(source.into());
        err
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, message)
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        let mut err = Self::internal(message);
        err.source = Some(source.into());
        err
    }

    /// Sets an explicit HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets a machine-readable code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attaches a header that must be copied onto the response.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Records the methods a path does support (routing errors).
    #[must_use]
    pub fn with_allowed_methods(mut self, methods: Vec<String>) -> Self {
        self.allowed_methods = methods;
        self
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the explicit status, if one was set.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Overwrites the explicit status.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Returns the status surfaced to the HTTP layer.
    ///
    /// Errors without an explicit status surface as 500, except for the
    /// categories whose constructors always set one.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.status
            .unwrap_or_else(|| self.category.default_status_code())
    }

    /// Returns the explicit code, if one was set.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Overwrites the code.
    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = Some(code.into());
    }

    /// Returns the headers to copy onto the response.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the structured validation entries.
    #[must_use]
    pub fn validation_errors(&self) -> &[ValidationError] {
        &self.validation_errors
    }

    /// Returns the methods a path supports (routing errors only).
    #[must_use]
    pub fn allowed_methods(&self) -> &[String] {
        &self.allowed_methods
    }

    /// Converts this error to a serializable envelope.
    #[must_use]
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self
                    .code
                    .clone()
                    .unwrap_or_else(|| self.category.default_code().to_string()),
                message: self.message.clone(),
                category: self.category,
                validation_errors: self.validation_errors.clone(),
            },
        }
    }
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Structured validation entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<ValidationError>,
}

/// Errors raised while assembling a runner.
#[derive(Error, Debug)]
pub enum SetupError {
    /// A pipe step names neither a fitting definition, a pipe, nor a
    /// registered fitting type.
    #[error("unknown fitting '{fitting}' referenced by pipe '{pipe}'")]
    UnknownFitting {
        /// The unresolved step name.
        fitting: String,
        /// The pipe that referenced it.
        pipe: String,
    },

    /// A fitting definition names a fitting type that is not registered.
    #[error("fitting definition '{definition}' uses unregistered fitting type '{fitting_type}'")]
    UnknownFittingType {
        /// The definition name.
        definition: String,
        /// The fitting type it asked for.
        fitting_type: String,
    },

    /// A fitting rejected its options.
    #[error("invalid options for fitting '{fitting}': {reason}")]
    InvalidFittingOptions {
        /// The fitting name.
        fitting: String,
        /// Why the options were rejected.
        reason: String,
    },

    /// Pipes reference each other in a cycle.
    #[error("pipe '{pipe}' references itself")]
    PipeCycle {
        /// The pipe where the cycle was detected.
        pipe: String,
    },

    /// The specification failed validation.
    #[error("specification validation errors: {}", format_entries(.errors))]
    InvalidSpec {
        /// The validation errors.
        errors: Vec<ValidationError>,
    },

    /// The specification produced warnings and warnings are fatal.
    #[error("specification validation warnings: {}", format_entries(.warnings))]
    SpecWarnings {
        /// The validation warnings.
        warnings: Vec<ValidationError>,
    },
}

impl SetupError {
    /// Creates an invalid-options error.
    pub fn invalid_options(fitting: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFittingOptions {
            fitting: fitting.into(),
            reason: reason.into(),
        }
    }
}

fn format_entries(entries: &[ValidationError]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

//! Response validation notifications.

use aqueduct_core::ValidationResults;
use http::{Method, StatusCode};

/// Capacity of the notification channel. Slow receivers lose the oldest
/// events.
pub const EVENT_CAPACITY: usize = 64;

/// A response that did not match its operation's declared responses.
///
/// Emitted after the response is written; the client is never affected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseValidationEvent {
    /// The operation id, when the operation declares one.
    pub operation_id: Option<String>,
    /// The request method.
    pub method: Method,
    /// The request path.
    pub path: String,
    /// The response status.
    pub status: StatusCode,
    /// The findings.
    pub results: ValidationResults,
}

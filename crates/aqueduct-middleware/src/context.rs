//! The exchange context.
//!
//! One [`ExchangeContext`] is created per request and threaded through
//! every fitting of the selected pipe. It owns the request and response
//! handles and the slots fittings communicate through: the error slot, the
//! status code, extra response headers, and the input and output values.

use crate::fitting::SharedFitting;
use aqueduct_core::{OperationMeta, PipeError, PipeRequest, PipeResponse};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::fmt;

/// Mutable per-request state shared by the fittings of a pipe.
///
/// # Example
///
/// ```
/// use aqueduct_core::PipeRequest;
/// use aqueduct_middleware::ExchangeContext;
/// use http::{Method, StatusCode, Uri};
/// use serde_json::json;
///
/// let mut ctx = ExchangeContext::new(PipeRequest::new(Method::GET, Uri::from_static("/pets")));
/// ctx.set_status_code(StatusCode::CREATED);
/// ctx.set_output(json!({"id": 1}));
///
/// assert_eq!(ctx.status_code(), Some(StatusCode::CREATED));
/// assert_eq!(ctx.output(), Some(&json!({"id": 1})));
/// ```
pub struct ExchangeContext {
    request: PipeRequest,
    response: PipeResponse,
    error: Option<PipeError>,
    status_code: Option<StatusCode>,
    headers: HeaderMap,
    input: Option<Value>,
    output: Option<Value>,
    error_handler: Option<SharedFitting>,
}

impl fmt::Debug for ExchangeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeContext")
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("error", &self.error)
            .field("status_code", &self.status_code)
            .field("headers", &self.headers)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl ExchangeContext {
    /// Creates a context around a request with a fresh response.
    #[must_use]
    pub fn new(request: PipeRequest) -> Self {
        Self::with_response(request, PipeResponse::new())
    }

    /// Creates a context around a request and an existing response.
    #[must_use]
    pub fn with_response(request: PipeRequest, response: PipeResponse) -> Self {
        Self {
            request,
            response,
            error: None,
            status_code: None,
            headers: HeaderMap::new(),
            input: None,
            output: None,
            error_handler: None,
        }
    }

    /// Sets the fallback recovery fitting (builder style).
    ///
    /// It runs when a fitting fails in a pipe that declares no recovery
    /// fitting of its own.
    #[must_use]
    pub fn with_error_handler(mut self, handler: SharedFitting) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Returns the fallback recovery fitting.
    #[must_use]
    pub fn error_handler(&self) -> Option<&SharedFitting> {
        self.error_handler.as_ref()
    }

    /// Returns the request.
    #[must_use]
    pub fn request(&self) -> &PipeRequest {
        &self.request
    }

    /// Returns the request mutably.
    pub fn request_mut(&mut self) -> &mut PipeRequest {
        &mut self.request
    }

    /// Returns the operation metadata attached to the request.
    #[must_use]
    pub fn meta(&self) -> &OperationMeta {
        self.request.meta()
    }

    /// Returns the response.
    #[must_use]
    pub fn response(&self) -> &PipeResponse {
        &self.response
    }

    /// Returns the response mutably.
    pub fn response_mut(&mut self) -> &mut PipeResponse {
        &mut self.response
    }

    /// Borrows the request and the response at once.
    pub fn split_mut(&mut self) -> (&PipeRequest, &mut PipeResponse) {
        (&self.request, &mut self.response)
    }

    /// Returns the pending error, if any.
    #[must_use]
    pub fn error(&self) -> Option<&PipeError> {
        self.error.as_ref()
    }

    /// Stores the pending error.
    pub fn set_error(&mut self, error: PipeError) {
        self.error = Some(error);
    }

    /// Removes and returns the pending error.
    pub fn take_error(&mut self) -> Option<PipeError> {
        self.error.take()
    }

    /// Returns the status code fittings asked for.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status_code
    }

    /// Sets the status code to apply when the response is finalized.
    pub fn set_status_code(&mut self, status: StatusCode) {
        self.status_code = Some(status);
    }

    /// Returns the headers to apply when the response is finalized.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the headers mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Sets a header to apply when the response is finalized.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), PipeError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| PipeError::internal_with_source(format!("invalid header name '{name}'"), e))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| PipeError::internal_with_source(format!("invalid value for header '{name}'"), e))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Returns the input value.
    #[must_use]
    pub fn input(&self) -> Option<&Value> {
        self.input.as_ref()
    }

    /// Sets the input value.
    pub fn set_input(&mut self, input: Value) {
        self.input = Some(input);
    }

    /// Returns the output value.
    #[must_use]
    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    /// Sets the output value.
    pub fn set_output(&mut self, output: Value) {
        self.output = Some(output);
    }

    /// Removes and returns the output value.
    pub fn take_output(&mut self) -> Option<Value> {
        self.output.take()
    }

    /// Consumes the context.
    #[must_use]
    pub fn into_parts(self) -> ExchangeParts {
        ExchangeParts {
            request: self.request,
            response: self.response,
            status_code: self.status_code,
            headers: self.headers,
            output: self.output,
        }
    }
}

/// What remains of a context once its pipe has finished.
#[derive(Debug)]
pub struct ExchangeParts {
    /// The request.
    pub request: PipeRequest,
    /// The response, not yet finalized.
    pub response: PipeResponse,
    /// The status code fittings asked for.
    pub status_code: Option<StatusCode>,
    /// Headers fittings asked for.
    pub headers: HeaderMap,
    /// The output value.
    pub output: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Uri};
    use serde_json::json;

    fn context() -> ExchangeContext {
        ExchangeContext::new(PipeRequest::new(Method::GET, Uri::from_static("/pets")))
    }

    #[test]
    fn test_new_context_is_empty() {
        let ctx = context();
        assert!(ctx.error().is_none());
        assert!(ctx.status_code().is_none());
        assert!(ctx.headers().is_empty());
        assert!(ctx.input().is_none());
        assert!(ctx.output().is_none());
        assert!(ctx.error_handler().is_none());
    }

    #[test]
    fn test_error_slot() {
        let mut ctx = context();
        ctx.set_error(PipeError::controller("boom"));
        assert_eq!(ctx.error().map(PipeError::message), Some("boom"));
        assert!(ctx.take_error().is_some());
        assert!(ctx.error().is_none());
    }

    #[test]
    fn test_set_header_rejects_invalid_name() {
        let mut ctx = context();
        assert!(ctx.set_header("Content-Type", "text/plain").is_ok());
        assert!(ctx.set_header("bad header", "x").is_err());
        assert_eq!(ctx.headers().get("content-type").unwrap(), "text/plain");
    }

    #[test]
    fn test_into_parts() {
        let mut ctx = context();
        ctx.set_status_code(StatusCode::ACCEPTED);
        ctx.set_output(json!("ok"));
        let parts = ctx.into_parts();
        assert_eq!(parts.status_code, Some(StatusCode::ACCEPTED));
        assert_eq!(parts.output, Some(json!("ok")));
        assert_eq!(parts.request.path(), "/pets");
    }
}

//! Response validation hook.
//!
//! [`ValidatingWriter`] decorates a response writer: it remembers the first
//! chunk written and, when the response ends after a single write, checks
//! status, headers and body against the operation's declared responses.
//! Findings are broadcast as [`ResponseValidationEvent`]s. The bytes sent to
//! the client are never altered.

use crate::events::ResponseValidationEvent;
use aqueduct_core::{Operation, PipeRequest, PipeResponse, ResponseHead, ResponseWriter};
use aqueduct_telemetry::metrics;
use bytes::Bytes;
use http::Method;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Writer decorator validating single-write responses.
pub struct ValidatingWriter {
    inner: Box<dyn ResponseWriter>,
    operation: Arc<Operation>,
    method: Method,
    path: String,
    events: broadcast::Sender<ResponseValidationEvent>,
    first: Option<Bytes>,
    writes: usize,
}

impl ValidatingWriter {
    /// Wraps `inner`.
    pub fn new(
        inner: Box<dyn ResponseWriter>,
        operation: Arc<Operation>,
        req: &PipeRequest,
        events: broadcast::Sender<ResponseValidationEvent>,
    ) -> Self {
        Self {
            inner,
            operation,
            method: req.method().clone(),
            path: req.path().to_string(),
            events,
            first: None,
            writes: 0,
        }
    }

    fn validate(&mut self, head: &ResponseHead) {
        if self.writes > 1 {
            debug!(path = %self.path, "multiple writes, will not validate response");
            return;
        }

        let body = self.first.take().unwrap_or_default();
        let results = self
            .operation
            .validate_response(head.status, &head.headers, &body);
        if results.is_clean() {
            return;
        }

        let operation_id = self.operation.operation_id().map(str::to_string);
        metrics::record_response_validation(
            operation_id.as_deref().unwrap_or("unknown"),
            results.errors.len(),
            results.warnings.len(),
        );
        debug!(
            operation_id = ?operation_id,
            errors = results.errors.len(),
            warnings = results.warnings.len(),
            "response validation findings"
        );

        let event = ResponseValidationEvent {
            operation_id,
            method: self.method.clone(),
            path: self.path.clone(),
            status: head.status,
            results,
        };
        if self.events.send(event).is_err() {
            debug!("response validation listeners went away");
        }
    }
}

impl ResponseWriter for ValidatingWriter {
    fn write(&mut self, head: &ResponseHead, chunk: Bytes) {
        self.writes += 1;
        if self.writes == 1 {
            self.first = Some(chunk.clone());
        } else {
            self.first = None;
        }
        self.inner.write(head, chunk);
    }

    fn end(&mut self, head: &ResponseHead) {
        self.validate(head);
        self.inner.end(head);
    }

    fn into_body(self: Box<Self>) -> Bytes {
        self.inner.into_body()
    }
}

/// Installs the hook on a response when the request is bound to an
/// operation.
pub fn install(
    response: &mut PipeResponse,
    req: &PipeRequest,
    events: &broadcast::Sender<ResponseValidationEvent>,
) {
    let Some(operation) = req.operation().cloned() else {
        debug!("not an api operation, will not validate response");
        return;
    };
    debug!("add response validation hook");
    let events = events.clone();
    response.wrap_writer(|inner| Box::new(ValidatingWriter::new(inner, operation, req, events)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EVENT_CAPACITY;
    use aqueduct_core::fixtures::petstore_spec;
    use http::header::{HeaderValue, CONTENT_TYPE};
    use http::{StatusCode, Uri};
    use http_body_util::BodyExt;

    fn bound_request(operation_id: &str) -> PipeRequest {
        let spec = petstore_spec();
        let mut req = PipeRequest::new(Method::GET, Uri::from_static("/pets/7"));
        req.meta_mut().operation = spec.operation_by_id(operation_id).cloned();
        req
    }

    fn hooked(
        req: &PipeRequest,
    ) -> (PipeResponse, broadcast::Receiver<ResponseValidationEvent>) {
        let (sender, receiver) = broadcast::channel(EVENT_CAPACITY);
        let mut response = PipeResponse::new();
        install(&mut response, req, &sender);
        (response, receiver)
    }

    fn json_response(response: &mut PipeResponse) {
        response.set_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    #[test]
    fn test_invalid_body_emits_event_without_changing_bytes() {
        let req = bound_request("getPet");
        let (mut response, mut receiver) = hooked(&req);
        json_response(&mut response);
        response.end(Some(Bytes::from_static(br#"{"id":"seven"}"#)));

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.operation_id.as_deref(), Some("getPet"));
        assert_eq!(event.status, StatusCode::OK);
        assert_eq!(event.path, "/pets/7");
        assert!(!event.results.errors.is_empty());

        let body = tokio_test::block_on(response.into_http().into_body().collect())
            .unwrap()
            .to_bytes();
        assert_eq!(body.as_ref(), br#"{"id":"seven"}"#);
    }

    #[test]
    fn test_valid_response_emits_nothing() {
        let req = bound_request("getPet");
        let (mut response, mut receiver) = hooked(&req);
        json_response(&mut response);
        response.end(Some(Bytes::from_static(br#"{"id":7,"name":"Rex"}"#)));

        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_multiple_writes_skip_validation() {
        let req = bound_request("getPet");
        let (mut response, mut receiver) = hooked(&req);
        json_response(&mut response);
        response.write(r#"{"id":"#).unwrap();
        response.end(Some(Bytes::from_static(br#""seven"}"#)));

        assert!(receiver.try_recv().is_err());
        let body = tokio_test::block_on(response.into_http().into_body().collect())
            .unwrap()
            .to_bytes();
        assert_eq!(body.as_ref(), br#"{"id":"seven"}"#);
    }

    #[test]
    fn test_undeclared_status_is_reported() {
        let req = bound_request("getPet");
        let (mut response, mut receiver) = hooked(&req);
        response.set_status(StatusCode::IM_A_TEAPOT);
        response.end(None);

        let event = receiver.try_recv().unwrap();
        assert_eq!(event.results.errors[0].code, "INVALID_RESPONSE_CODE");
    }

    #[test]
    fn test_unbound_request_is_not_hooked() {
        let req = PipeRequest::new(Method::GET, Uri::from_static("/nowhere"));
        let (mut response, mut receiver) = hooked(&req);
        response.set_status(StatusCode::IM_A_TEAPOT);
        response.end(None);

        assert!(receiver.try_recv().is_err());
    }
}

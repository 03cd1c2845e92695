//! The outbound response handle.
//!
//! [`PipeResponse`] owns the status line and headers ([`ResponseHead`]) and
//! forwards body bytes to a [`ResponseWriter`]. Writers can be decorated
//! with [`PipeResponse::wrap_writer`] to observe the outbound stream without
//! changing what the client receives.

use crate::error::PipeError;
use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use std::fmt;

/// Status and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }
}

/// Sink for response body bytes.
///
/// `write` may be called any number of times before `end`, which is called
/// exactly once. Both receive the head as it stands at that moment.
pub trait ResponseWriter: Send {
    /// Writes one body chunk.
    fn write(&mut self, head: &ResponseHead, chunk: Bytes);

    /// Finishes the body.
    fn end(&mut self, head: &ResponseHead);

    /// Returns the bytes delivered to the client.
    fn into_body(self: Box<Self>) -> Bytes;
}

/// Writer that collects the body in memory.
#[derive(Debug, Default)]
pub struct BufferedWriter {
    body: BytesMut,
}

impl ResponseWriter for BufferedWriter {
    fn write(&mut self, _head: &ResponseHead, chunk: Bytes) {
        self.body.extend_from_slice(&chunk);
    }

    fn end(&mut self, _head: &ResponseHead) {}

    fn into_body(self: Box<Self>) -> Bytes {
        self.body.freeze()
    }
}

/// An in-flight response.
pub struct PipeResponse {
    head: ResponseHead,
    writer: Box<dyn ResponseWriter>,
    ended: bool,
}

impl Default for PipeResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PipeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeResponse")
            .field("head", &self.head)
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}

impl PipeResponse {
    /// Creates a `200 OK` response backed by a [`BufferedWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: ResponseHead::default(),
            writer: Box::new(BufferedWriter::default()),
            ended: false,
        }
    }

    /// Returns the head.
    #[must_use]
    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    /// Returns the head mutably.
    pub fn head_mut(&mut self) -> &mut ResponseHead {
        &mut self.head
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) {
        self.head.status = status;
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Returns the headers mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.head.headers
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.head.headers.insert(name, value);
    }

    /// Returns the `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.head
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Sets the `Content-Type` header.
    pub fn set_content_type(&mut self, content_type: &str) -> Result<(), PipeError> {
        let value = HeaderValue::from_str(content_type).map_err(|e| {
            PipeError::internal_with_source(format!("invalid content type '{content_type}'"), e)
        })?;
        self.head.headers.insert(CONTENT_TYPE, value);
        Ok(())
    }

    /// Returns true once [`end`](Self::end) has been called.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Writes a body chunk.
    pub fn write(&mut self, chunk: impl Into<Bytes>) -> Result<(), PipeError> {
        if self.ended {
            return Err(PipeError::internal("write after end"));
        }
        self.writer.write(&self.head, chunk.into());
        Ok(())
    }

    /// Writes an optional final chunk and ends the response. Ending an
    /// already ended response does nothing.
    pub fn end(&mut self, chunk: Option<Bytes>) {
        if self.ended {
            return;
        }
        if let Some(chunk) = chunk {
            self.writer.write(&self.head, chunk);
        }
        self.writer.end(&self.head);
        self.ended = true;
    }

    /// Replaces the writer with a decorator around it.
    pub fn wrap_writer<F>(&mut self, wrap: F)
    where
        F: FnOnce(Box<dyn ResponseWriter>) -> Box<dyn ResponseWriter>,
    {
        let inner = std::mem::replace(&mut self.writer, Box::new(BufferedWriter::default()));
        self.writer = wrap(inner);
    }

    /// Converts into an `http::Response`, ending it first if needed.
    #[must_use]
    pub fn into_http(mut self) -> http::Response<Full<Bytes>> {
        self.end(None);
        let body = self.writer.into_body();
        let mut response = http::Response::new(Full::new(body));
        *response.status_mut() = self.head.status;
        *response.headers_mut() = self.head.headers;
        response
    }
}

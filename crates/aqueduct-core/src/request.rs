//! The inbound request handle.
//!
//! [`PipeRequest`] carries the raw HTTP request plus the parsed state the
//! pipeline accumulates: query, body and file data (once parsed) and the
//! [`OperationMeta`] attached by the operation binder.

use crate::spec::{Operation, PathItem};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, Uri};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Operation identity attached to a request by the binder.
#[derive(Debug, Clone, Default)]
pub struct OperationMeta {
    /// The declared path the request matched, if any.
    pub path: Option<Arc<PathItem>>,
    /// The declared operation the request matched, if any.
    pub operation: Option<Arc<Operation>>,
    /// Parameter values extracted by the params parser, by name.
    pub params: Map<String, Value>,
}

impl OperationMeta {
    /// Returns the operation id, or `None` when no operation matched or it
    /// declares no id.
    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.operation.as_ref().and_then(|op| op.operation_id())
    }
}

/// An in-flight request.
#[derive(Debug, Clone)]
pub struct PipeRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    raw_body: Bytes,
    query: Option<Map<String, Value>>,
    body: Option<Value>,
    files: Option<Map<String, Value>>,
    path_params: HashMap<String, String>,
    meta: OperationMeta,
}

impl PipeRequest {
    /// Creates a request with no headers and an empty body.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            raw_body: Bytes::new(),
            query: None,
            body: None,
            files: None,
            path_params: HashMap::new(),
            meta: OperationMeta::default(),
        }
    }

    /// Converts an `http::Request` with a collected body.
    #[must_use]
    pub fn from_http(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        let mut req = Self::new(parts.method, parts.uri);
        req.headers = parts.headers;
        req.raw_body = body;
        req
    }

    /// Adds a header (builder style).
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the raw body (builder style).
    #[must_use]
    pub fn with_raw_body(mut self, body: impl Into<Bytes>) -> Self {
        self.raw_body = body.into();
        self
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string. Lookup is case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Returns the unparsed body bytes.
    #[must_use]
    pub fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    /// Returns the parsed query, if it has been parsed.
    #[must_use]
    pub fn query(&self) -> Option<&Map<String, Value>> {
        self.query.as_ref()
    }

    /// Stores the parsed query.
    pub fn set_query(&mut self, query: Map<String, Value>) {
        self.query = Some(query);
    }

    /// Parses the URI query string.
    ///
    /// Repeated keys collect into an array in order of appearance. A
    /// malformed query string parses as empty.
    #[must_use]
    pub fn parse_query_string(&self) -> Map<String, Value> {
        let pairs: Vec<(String, String)> = self
            .uri
            .query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default();
        collect_pairs(pairs)
    }

    /// Returns the parsed body, if it has been parsed.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Stores the parsed body.
    pub fn set_body(&mut self, body: Value) {
        self.body = Some(body);
    }

    /// Returns the parsed file data, if any.
    #[must_use]
    pub fn files(&self) -> Option<&Map<String, Value>> {
        self.files.as_ref()
    }

    /// Stores parsed file data.
    pub fn set_files(&mut self, files: Map<String, Value>) {
        self.files = Some(files);
    }

    /// Returns true when query, body and file data are all already parsed.
    #[must_use]
    pub fn is_fully_parsed(&self) -> bool {
        self.query.is_some() && self.body.is_some() && self.files.is_some()
    }

    /// Returns the path parameters bound by the binder.
    #[must_use]
    pub fn path_params(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    /// Stores path parameters.
    pub fn set_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
    }

    /// Returns the operation metadata.
    #[must_use]
    pub fn meta(&self) -> &OperationMeta {
        &self.meta
    }

    /// Returns the operation metadata mutably.
    pub fn meta_mut(&mut self) -> &mut OperationMeta {
        &mut self.meta
    }

    /// Shortcut for the bound operation.
    #[must_use]
    pub fn operation(&self) -> Option<&Arc<Operation>> {
        self.meta.operation.as_ref()
    }
}

/// Parses an `application/x-www-form-urlencoded` payload into a JSON object.
///
/// Repeated keys collect into an array, as for the query string.
pub fn parse_urlencoded(input: &[u8]) -> Result<Map<String, Value>, serde_urlencoded::de::Error> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(input)?;
    Ok(collect_pairs(pairs))
}

/// Groups `(key, value)` pairs into a JSON object, turning repeated keys
/// into arrays.
pub(crate) fn collect_pairs(pairs: Vec<(String, String)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        match map.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_http() {
        let http_req = http::Request::builder()
            .method(Method::POST)
            .uri("/pets?limit=10")
            .header("content-type", "application/json")
            .body(Bytes::from_static(b"{\"name\":\"Rex\"}"))
            .unwrap();

        let req = PipeRequest::from_http(http_req);
        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.path(), "/pets");
        assert_eq!(req.content_type(), Some("application/json"));
        assert_eq!(req.raw_body().as_ref(), b"{\"name\":\"Rex\"}");
        assert!(req.body().is_none());
        assert!(!req.is_fully_parsed());
    }

    #[test]
    fn test_parse_query_string_repeated_keys() {
        let req = PipeRequest::new(Method::GET, Uri::from_static("/pets?tag=a&tag=b&limit=5"));
        let query = req.parse_query_string();
        assert_eq!(query.get("tag"), Some(&json!(["a", "b"])));
        assert_eq!(query.get("limit"), Some(&json!("5")));
    }

    #[test]
    fn test_parse_urlencoded() {
        let form = parse_urlencoded(b"name=Rex&tag=dog&tag=good").unwrap();
        assert_eq!(form.get("name"), Some(&json!("Rex")));
        assert_eq!(form.get("tag"), Some(&json!(["dog", "good"])));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = PipeRequest::new(Method::GET, Uri::from_static("/"))
            .with_header(HeaderName::from_static("x-api-key"), HeaderValue::from_static("abc"));
        assert_eq!(req.header("X-API-Key"), Some("abc"));
    }

    #[test]
    fn test_fully_parsed() {
        let mut req = PipeRequest::new(Method::GET, Uri::from_static("/"));
        req.set_query(Map::new());
        req.set_body(json!({}));
        assert!(!req.is_fully_parsed());
        req.set_files(Map::new());
        assert!(req.is_fully_parsed());
    }
}

//! Request body parsers.
//!
//! The params parser fitting drives three parsers in a fixed order:
//! URL-encoded forms, JSON, then plain text. Each one declares the media
//! types it accepts through a [`TypeMatcher`].

use crate::fitting::BoxFuture;
use aqueduct_core::{parse_urlencoded, PipeError, PipeRequest};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Decides whether a parser accepts a request.
#[derive(Clone)]
pub enum TypeMatcher {
    /// Media type patterns: `application/json`, `text/*`, `*/*`,
    /// `application/*+json`, or the shorthands `json`, `urlencoded`,
    /// `text` and `multipart`.
    Types(Vec<String>),
    /// A custom predicate. The parser is always invoked and applies the
    /// predicate itself.
    Custom(Arc<dyn Fn(&PipeRequest) -> bool + Send + Sync>),
}

impl fmt::Debug for TypeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Types(types) => f.debug_tuple("Types").field(types).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl TypeMatcher {
    /// Creates a matcher from media type patterns.
    #[must_use]
    pub fn types(types: &[&str]) -> Self {
        Self::Types(types.iter().map(|t| (*t).to_string()).collect())
    }

    /// Creates a matcher from a predicate.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&PipeRequest) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Returns true if the request is acceptable.
    #[must_use]
    pub fn matches(&self, req: &PipeRequest) -> bool {
        match self {
            Self::Types(types) => req
                .content_type()
                .is_some_and(|ct| types.iter().any(|t| media_type_matches(t, ct))),
            Self::Custom(predicate) => predicate(req),
        }
    }

    /// Returns true if the params parser should not invoke the parser at
    /// all. Custom matchers never skip.
    #[must_use]
    pub fn skips(&self, req: &PipeRequest) -> bool {
        match self {
            Self::Types(_) => !self.matches(req),
            Self::Custom(_) => false,
        }
    }
}

/// Returns true if `content_type` matches `pattern`.
///
/// ```
/// use aqueduct_middleware::parsers::media_type_matches;
///
/// assert!(media_type_matches("json", "application/json; charset=utf-8"));
/// assert!(media_type_matches("application/*+json", "application/vnd.api+json"));
/// assert!(media_type_matches("*/*", "image/png"));
/// assert!(!media_type_matches("text/plain", "text/html"));
/// ```
#[must_use]
pub fn media_type_matches(pattern: &str, content_type: &str) -> bool {
    let Ok(actual) = content_type.parse::<mime::Mime>() else {
        return false;
    };
    let Some((actual_type, actual_subtype)) = actual.essence_str().split_once('/') else {
        return false;
    };

    let pattern = match pattern.trim() {
        "json" => "application/json",
        "urlencoded" => "application/x-www-form-urlencoded",
        "text" => "text/plain",
        "multipart" => "multipart/*",
        other => other,
    };
    let Some((pattern_type, pattern_subtype)) = pattern.split_once('/') else {
        return false;
    };

    let type_matches = pattern_type == "*" || pattern_type.eq_ignore_ascii_case(actual_type);
    let subtype_matches = pattern_subtype == "*"
        || pattern_subtype.eq_ignore_ascii_case(actual_subtype)
        || pattern_subtype.strip_prefix("*+").is_some_and(|suffix| {
            actual_subtype
                .rsplit_once('+')
                .is_some_and(|(_, actual_suffix)| actual_suffix.eq_ignore_ascii_case(suffix))
        });

    type_matches && subtype_matches
}

/// Parses a request body.
pub trait BodyParser: Send + Sync + 'static {
    /// Returns the parser name used in logs.
    fn name(&self) -> &str;

    /// Returns the matcher deciding which requests this parser accepts.
    fn matcher(&self) -> &TypeMatcher;

    /// Parses the raw body.
    ///
    /// Returns `Ok(None)` when the parser does not apply or the body is
    /// empty.
    fn parse<'a>(&'a self, req: &'a PipeRequest) -> BoxFuture<'a, Result<Option<Value>, PipeError>>;
}

/// Parses `application/x-www-form-urlencoded` bodies into objects.
#[derive(Debug, Clone)]
pub struct UrlencodedParser {
    matcher: TypeMatcher,
}

impl Default for UrlencodedParser {
    fn default() -> Self {
        Self {
            matcher: TypeMatcher::types(&["urlencoded"]),
        }
    }
}

impl UrlencodedParser {
    /// Creates a parser with a custom matcher.
    #[must_use]
    pub fn with_matcher(matcher: TypeMatcher) -> Self {
        Self { matcher }
    }
}

impl BodyParser for UrlencodedParser {
    fn name(&self) -> &str {
        "urlencoded"
    }

    fn matcher(&self) -> &TypeMatcher {
        &self.matcher
    }

    fn parse<'a>(&'a self, req: &'a PipeRequest) -> BoxFuture<'a, Result<Option<Value>, PipeError>> {
        Box::pin(async move {
            if req.raw_body().is_empty() || !self.matcher.matches(req) {
                return Ok(None);
            }
            let form = parse_urlencoded(req.raw_body()).map_err(|e| {
                PipeError::validation(format!("invalid urlencoded body: {e}"))
            })?;
            Ok(Some(Value::Object(form)))
        })
    }
}

/// Parses JSON bodies.
#[derive(Debug, Clone)]
pub struct JsonParser {
    matcher: TypeMatcher,
}

impl Default for JsonParser {
    fn default() -> Self {
        Self {
            matcher: TypeMatcher::types(&["json", "application/*+json"]),
        }
    }
}

impl JsonParser {
    /// Creates a parser with a custom matcher.
    #[must_use]
    pub fn with_matcher(matcher: TypeMatcher) -> Self {
        Self { matcher }
    }
}

impl BodyParser for JsonParser {
    fn name(&self) -> &str {
        "json"
    }

    fn matcher(&self) -> &TypeMatcher {
        &self.matcher
    }

    fn parse<'a>(&'a self, req: &'a PipeRequest) -> BoxFuture<'a, Result<Option<Value>, PipeError>> {
        Box::pin(async move {
            if req.raw_body().is_empty() || !self.matcher.matches(req) {
                return Ok(None);
            }
            let value = serde_json::from_slice(req.raw_body())
                .map_err(|e| PipeError::validation(format!("invalid JSON body: {e}")))?;
            Ok(Some(value))
        })
    }
}

/// Reads bodies of any media type as text.
#[derive(Debug, Clone)]
pub struct TextParser {
    matcher: TypeMatcher,
}

impl Default for TextParser {
    fn default() -> Self {
        Self {
            matcher: TypeMatcher::types(&["*/*"]),
        }
    }
}

impl TextParser {
    /// Creates a parser with a custom matcher.
    #[must_use]
    pub fn with_matcher(matcher: TypeMatcher) -> Self {
        Self { matcher }
    }
}

impl BodyParser for TextParser {
    fn name(&self) -> &str {
        "text"
    }

    fn matcher(&self) -> &TypeMatcher {
        &self.matcher
    }

    fn parse<'a>(&'a self, req: &'a PipeRequest) -> BoxFuture<'a, Result<Option<Value>, PipeError>> {
        Box::pin(async move {
            if req.raw_body().is_empty() || !self.matcher.matches(req) {
                return Ok(None);
            }
            let text = std::str::from_utf8(req.raw_body())
                .map_err(|e| PipeError::validation(format!("body is not valid UTF-8: {e}")))?;
            Ok(Some(Value::String(text.to_string())))
        })
    }
}

/// The three parsers, in the order they are tried.
#[derive(Clone)]
pub struct BodyParsers {
    /// Tried first, and only when the operation declares form parameters.
    pub urlencoded: Arc<dyn BodyParser>,
    /// Tried second.
    pub json: Arc<dyn BodyParser>,
    /// Tried last.
    pub text: Arc<dyn BodyParser>,
}

impl Default for BodyParsers {
    fn default() -> Self {
        Self {
            urlencoded: Arc::new(UrlencodedParser::default()),
            json: Arc::new(JsonParser::default()),
            text: Arc::new(TextParser::default()),
        }
    }
}

impl fmt::Debug for BodyParsers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyParsers")
            .field("urlencoded", &self.urlencoded.name())
            .field("json", &self.json.name())
            .field("text", &self.text.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderValue, CONTENT_TYPE};
    use http::{Method, Uri};
    use serde_json::json;

    fn request(content_type: &str, body: &'static str) -> PipeRequest {
        PipeRequest::new(Method::POST, Uri::from_static("/"))
            .with_header(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap())
            .with_raw_body(body)
    }

    #[test]
    fn test_media_type_matching() {
        assert!(media_type_matches("application/json", "Application/JSON"));
        assert!(media_type_matches("text/*", "text/csv"));
        assert!(media_type_matches("urlencoded", "application/x-www-form-urlencoded"));
        assert!(!media_type_matches("json", "text/plain"));
        assert!(!media_type_matches("application/*+json", "application/json"));
        assert!(!media_type_matches("json", "not a media type"));
    }

    #[test]
    fn test_matcher_without_content_type() {
        let req = PipeRequest::new(Method::POST, Uri::from_static("/")).with_raw_body("x");
        assert!(!TypeMatcher::types(&["*/*"]).matches(&req));
        assert!(TypeMatcher::types(&["*/*"]).skips(&req));
    }

    #[test]
    fn test_custom_matcher_never_skips() {
        let matcher = TypeMatcher::custom(|_| false);
        let req = request("application/json", "{}");
        assert!(!matcher.matches(&req));
        assert!(!matcher.skips(&req));
    }

    #[tokio::test]
    async fn test_json_parser() {
        let parser = JsonParser::default();
        let req = request("application/json", r#"{"name":"Rex"}"#);
        assert_eq!(parser.parse(&req).await.unwrap(), Some(json!({"name": "Rex"})));

        let req = request("application/json", "{not json");
        let err = parser.parse(&req).await.unwrap_err();
        assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_json_parser_ignores_empty_body() {
        let req = request("application/json", "");
        assert_eq!(JsonParser::default().parse(&req).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_urlencoded_parser() {
        let req = request("application/x-www-form-urlencoded", "name=Rex&tag=dog");
        let parsed = UrlencodedParser::default().parse(&req).await.unwrap();
        assert_eq!(parsed, Some(json!({"name": "Rex", "tag": "dog"})));
    }

    #[tokio::test]
    async fn test_text_parser() {
        let req = request("text/csv", "a,b");
        assert_eq!(TextParser::default().parse(&req).await.unwrap(), Some(json!("a,b")));
    }

    #[tokio::test]
    async fn test_custom_matcher_is_applied_by_parser() {
        let parser = JsonParser::with_matcher(TypeMatcher::custom(|req| {
            req.header("x-json").is_some()
        }));
        let req = request("text/plain", r#"{"a":1}"#);
        assert_eq!(parser.parse(&req).await.unwrap(), None);

        let req = req.with_header(
            http::header::HeaderName::from_static("x-json"),
            HeaderValue::from_static("1"),
        );
        assert_eq!(parser.parse(&req).await.unwrap(), Some(json!({"a": 1})));
    }
}

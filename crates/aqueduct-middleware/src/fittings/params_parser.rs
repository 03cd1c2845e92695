//! The `swagger_params_parser` fitting.
//!
//! Parses only what the bound operation needs, at most once per request,
//! then extracts every declared parameter into `meta.params`.

use crate::context::ExchangeContext;
use crate::fitting::{BoxFuture, Fitting, FittingResult};
use crate::parsers::{BodyParser, BodyParsers};
use aqueduct_core::{Parameter, ParameterLocation, PipeError, PipeRequest};
use serde_json::{Map, Value};
use tracing::debug;

/// Fitting type name.
pub const PARAMS_PARSER: &str = "swagger_params_parser";

/// Body parsing and parameter extraction.
#[derive(Debug, Clone, Default)]
pub struct ParamsParserFitting {
    parsers: BodyParsers,
}

#[derive(Debug, Default)]
struct ParseNeeds {
    body: bool,
    form: bool,
    query: bool,
    uploads: Vec<String>,
}

impl ParseNeeds {
    fn classify(params: &[Parameter]) -> Self {
        let mut needs = Self::default();
        for param in params {
            match param.location() {
                ParameterLocation::Body => needs.body = true,
                ParameterLocation::FormData => {
                    needs.form = true;
                    if param.is_file_upload() {
                        needs.uploads.push(param.name().to_string());
                    }
                }
                ParameterLocation::Query => needs.query = true,
                ParameterLocation::Header | ParameterLocation::Path => {}
            }
        }
        needs
    }
}

impl ParamsParserFitting {
    /// Creates the fitting with the default parsers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the fitting with custom parsers.
    #[must_use]
    pub fn with_parsers(parsers: BodyParsers) -> Self {
        Self { parsers }
    }

    /// Parses whatever the declared parameters require.
    ///
    /// Does nothing when query, body and files are all already present.
    /// The query string is parsed when a query parameter is declared. The
    /// body is parsed when a body or form parameter is declared and no body
    /// is present yet: URL-encoded first (form parameters only), then JSON,
    /// then text, stopping at the first parser that produces a value.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a file upload parameter is
    /// declared, and a parser's error when a body is malformed.
    pub async fn parse_request(
        &self,
        req: &mut PipeRequest,
        params: &[Parameter],
    ) -> Result<(), PipeError> {
        if req.is_fully_parsed() {
            return Ok(());
        }

        let needs = ParseNeeds::classify(params);

        if needs.query && req.query().is_none() {
            let query = req.parse_query_string();
            req.set_query(query);
        }

        if req.body().is_some() || (!needs.body && !needs.form) {
            return Ok(());
        }

        if !needs.uploads.is_empty() {
            debug!(parameters = ?needs.uploads, "file upload parameters declared");
            return Err(PipeError::configuration(
                "file uploads are not supported by this api",
            ));
        }

        debug!(content_type = ?req.content_type(), "parsing request body");

        if needs.form {
            Self::try_parser(self.parsers.urlencoded.as_ref(), req).await?;
        }
        if req.body().is_none() {
            Self::try_parser(self.parsers.json.as_ref(), req).await?;
        }
        if req.body().is_none() {
            Self::try_parser(self.parsers.text.as_ref(), req).await?;
        }

        Ok(())
    }

    async fn try_parser(parser: &dyn BodyParser, req: &mut PipeRequest) -> Result<(), PipeError> {
        if parser.matcher().skips(req) {
            return Ok(());
        }
        let parsed = parser.parse(req).await?;
        if let Some(body) = parsed {
            debug!(parser = parser.name(), "request body parsed");
            req.set_body(body);
        }
        Ok(())
    }
}

impl Fitting for ParamsParserFitting {
    fn name(&self) -> &str {
        PARAMS_PARSER
    }

    fn run<'a>(&'a self, ctx: &'a mut ExchangeContext) -> BoxFuture<'a, FittingResult> {
        Box::pin(async move {
            let operation = ctx.request().operation().cloned();
            let params = operation.as_deref().map(|op| op.parameters()).unwrap_or_default();

            self.parse_request(ctx.request_mut(), params).await?;

            let req = ctx.request();
            let values: Map<String, Value> = params
                .iter()
                .filter_map(|param| param.value(req).map(|v| (param.name().to_string(), v)))
                .collect();

            ctx.request_mut().meta_mut().params = values.clone();
            Ok(Some(Value::Object(values)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::BoxFuture;
    use crate::parsers::{JsonParser, TypeMatcher};
    use aqueduct_core::fixtures::petstore_spec;
    use aqueduct_core::{ErrorCategory, ParameterType};
    use http::header::{HeaderValue, CONTENT_TYPE};
    use http::{Method, Uri};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingParser {
        calls: Arc<AtomicUsize>,
        inner: JsonParser,
    }

    impl BodyParser for CountingParser {
        fn name(&self) -> &str {
            "counting"
        }

        fn matcher(&self) -> &TypeMatcher {
            self.inner.matcher()
        }

        fn parse<'a>(
            &'a self,
            req: &'a PipeRequest,
        ) -> BoxFuture<'a, Result<Option<Value>, PipeError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.parse(req)
        }
    }

    fn bound(method: Method, uri: &'static str) -> PipeRequest {
        let spec = petstore_spec();
        let mut req = PipeRequest::new(method.clone(), Uri::from_static(uri));
        let (path, op, params) = {
            let (path, params) = spec.match_path(req.path()).unwrap();
            (path.clone(), path.operation(&method).cloned(), params)
        };
        req.set_path_params(params);
        req.meta_mut().path = Some(path);
        req.meta_mut().operation = op;
        req
    }

    fn json_body(req: PipeRequest, body: &'static str) -> PipeRequest {
        req.with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_raw_body(body)
    }

    #[tokio::test]
    async fn test_extracts_declared_params() {
        let req = bound(Method::GET, "/pets?limit=5&tags=a&tags=b");
        let mut ctx = ExchangeContext::new(req);

        let output = ParamsParserFitting::new().run(&mut ctx).await.unwrap();
        assert_eq!(output, Some(json!({"limit": 5, "tags": ["a", "b"]})));
        assert_eq!(ctx.meta().params.get("limit"), Some(&json!(5)));
        assert!(ctx.request().query().is_some());
        assert!(ctx.request().body().is_none());
    }

    #[tokio::test]
    async fn test_parses_json_body() {
        let req = json_body(bound(Method::POST, "/pets"), r#"{"name":"Rex"}"#);
        let mut ctx = ExchangeContext::new(req);

        let output = ParamsParserFitting::new().run(&mut ctx).await.unwrap();
        assert_eq!(output, Some(json!({"pet": {"name": "Rex"}})));
        assert_eq!(ctx.request().body(), Some(&json!({"name": "Rex"})));
    }

    #[tokio::test]
    async fn test_rejects_file_uploads() {
        let req = bound(Method::POST, "/pets/1/photo")
            .with_header(CONTENT_TYPE, HeaderValue::from_static("multipart/form-data"));
        let mut ctx = ExchangeContext::new(req);

        let err = ParamsParserFitting::new().run(&mut ctx).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.message(), "file uploads are not supported by this api");
    }

    #[tokio::test]
    async fn test_body_parsed_at_most_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let parsers = BodyParsers {
            json: Arc::new(CountingParser {
                calls: calls.clone(),
                inner: JsonParser::default(),
            }),
            ..BodyParsers::default()
        };
        let fitting = ParamsParserFitting::with_parsers(parsers);

        let req = json_body(bound(Method::POST, "/pets"), r#"{"name":"Rex"}"#);
        let mut ctx = ExchangeContext::new(req);

        fitting.run(&mut ctx).await.unwrap();
        fitting.run(&mut ctx).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.meta().params.get("pet"), Some(&json!({"name": "Rex"})));
    }

    #[tokio::test]
    async fn test_skips_parser_on_content_type_mismatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let parsers = BodyParsers {
            json: Arc::new(CountingParser {
                calls: calls.clone(),
                inner: JsonParser::default(),
            }),
            ..BodyParsers::default()
        };
        let req = bound(Method::POST, "/pets")
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .with_raw_body("Rex");
        let mut ctx = ExchangeContext::new(req);

        ParamsParserFitting::with_parsers(parsers).run(&mut ctx).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.request().body(), Some(&json!("Rex")));
    }

    #[tokio::test]
    async fn test_urlencoded_only_for_form_params() {
        let params = vec![Parameter::form_data("name", ParameterType::String)];
        let mut req = PipeRequest::new(Method::POST, Uri::from_static("/"))
            .with_header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .with_raw_body("name=Rex");
        ParamsParserFitting::new().parse_request(&mut req, &params).await.unwrap();
        assert_eq!(req.body(), Some(&json!({"name": "Rex"})));

        let params = vec![Parameter::body("raw", aqueduct_core::Schema::any())];
        let mut req = PipeRequest::new(Method::POST, Uri::from_static("/"))
            .with_header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .with_raw_body("name=Rex");
        ParamsParserFitting::new().parse_request(&mut req, &params).await.unwrap();
        assert_eq!(req.body(), Some(&json!("name=Rex")));
    }

    #[tokio::test]
    async fn test_fully_parsed_request_is_untouched() {
        let params = vec![Parameter::query("q", ParameterType::String)];
        let mut req = PipeRequest::new(Method::GET, Uri::from_static("/?q=ignored"));
        req.set_query(Map::new());
        req.set_body(json!({}));
        req.set_files(Map::new());
        ParamsParserFitting::new().parse_request(&mut req, &params).await.unwrap();
        assert_eq!(req.query(), Some(&Map::new()));
    }

    #[tokio::test]
    async fn test_without_operation() {
        let mut ctx = ExchangeContext::new(PipeRequest::new(Method::GET, Uri::from_static("/x")));
        let output = ParamsParserFitting::new().run(&mut ctx).await.unwrap();
        assert_eq!(output, Some(json!({})));
    }
}

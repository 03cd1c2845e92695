//! The `swagger_security` fitting.
//!
//! An operation's security is a list of requirement sets. The request is
//! allowed when every scheme of at least one set passes. All sets are
//! evaluated concurrently, and so are the schemes within a set; the
//! outcome only depends on declaration order, never on completion order.

use crate::context::ExchangeContext;
use crate::fitting::{BoxFuture, Fitting, FittingResult};
use aqueduct_core::spec::ApiKeyLocation;
use aqueduct_core::{ApiSpec, PipeError, PipeRequest, ResponseHead, SecurityRequirement, SecurityScheme};
use aqueduct_telemetry::metrics;
use futures_util::future::join_all;
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Fitting type name.
pub const SECURITY: &str = "swagger_security";

/// Credential material handed to scheme handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeOrKey {
    /// OAuth2 scopes required by the requirement set.
    Scopes(Vec<String>),
    /// The API key found in the query string or header.
    Key(String),
}

/// Shared response head handed to request/response handlers.
///
/// Handlers in the same evaluation run concurrently and share one head;
/// changes are copied onto the real response once evaluation ends.
#[derive(Debug, Clone, Default)]
pub struct ResponseHandle {
    head: Arc<Mutex<ResponseHead>>,
}

impl ResponseHandle {
    /// Wraps a response head.
    #[must_use]
    pub fn new(head: ResponseHead) -> Self {
        Self {
            head: Arc::new(Mutex::new(head)),
        }
    }

    /// Sets the status code.
    pub fn set_status(&self, status: StatusCode) {
        self.head.lock().status = status;
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.head.lock().headers.insert(name, value);
    }

    /// Returns a copy of the head.
    #[must_use]
    pub fn head(&self) -> ResponseHead {
        self.head.lock().clone()
    }
}

/// Future returned by security handlers.
pub type SecurityFuture<'a> = BoxFuture<'a, Result<(), PipeError>>;

type SchemeCheck = Arc<
    dyn for<'a> Fn(&'a PipeRequest, &'a SecurityScheme, Option<ScopeOrKey>) -> SecurityFuture<'a>
        + Send
        + Sync,
>;

type RequestResponseCheck =
    Arc<dyn for<'a> Fn(&'a PipeRequest, ResponseHandle) -> SecurityFuture<'a> + Send + Sync>;

/// A security handler in one of the two calling conventions.
#[derive(Clone)]
pub enum SecurityHandler {
    /// Receives the request, the scheme definition and the extracted scopes
    /// or API key.
    Scheme(SchemeCheck),
    /// Receives the request and the response, for handlers that manage
    /// response side effects such as redirects.
    RequestResponse(RequestResponseCheck),
}

impl fmt::Debug for SecurityHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheme(_) => f.write_str("SecurityHandler::Scheme"),
            Self::RequestResponse(_) => f.write_str("SecurityHandler::RequestResponse"),
        }
    }
}

impl SecurityHandler {
    /// Creates a scheme-aware handler.
    ///
    /// ```
    /// use aqueduct_middleware::fittings::security::{ScopeOrKey, SecurityHandler};
    /// use aqueduct_core::PipeError;
    ///
    /// let handler = SecurityHandler::scheme(|_req, _scheme, key| {
    ///     Box::pin(async move {
    ///         match key {
    ///             Some(ScopeOrKey::Key(k)) if k == "secret" => Ok(()),
    ///             _ => Err(PipeError::authorization("bad api key")),
    ///         }
    ///     })
    /// });
    /// ```
    pub fn scheme<F>(check: F) -> Self
    where
        F: for<'a> Fn(&'a PipeRequest, &'a SecurityScheme, Option<ScopeOrKey>) -> SecurityFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        Self::Scheme(Arc::new(check))
    }

    /// Creates a request/response handler.
    pub fn request_response<F>(check: F) -> Self
    where
        F: for<'a> Fn(&'a PipeRequest, ResponseHandle) -> SecurityFuture<'a> + Send + Sync + 'static,
    {
        Self::RequestResponse(Arc::new(check))
    }
}

/// Security handlers by scheme name.
#[derive(Debug, Clone, Default)]
pub struct SecurityHandlers {
    handlers: HashMap<String, SecurityHandler>,
}

impl SecurityHandlers {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for a scheme (builder style).
    #[must_use]
    pub fn with(mut self, scheme: impl Into<String>, handler: SecurityHandler) -> Self {
        self.insert(scheme, handler);
        self
    }

    /// Registers the handler for a scheme.
    pub fn insert(&mut self, scheme: impl Into<String>, handler: SecurityHandler) {
        self.handlers.insert(scheme.into(), handler);
    }

    /// Returns the handler for a scheme.
    #[must_use]
    pub fn get(&self, scheme: &str) -> Option<&SecurityHandler> {
        self.handlers.get(scheme)
    }

    /// Returns the number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Outcome of one requirement set.
#[derive(Debug)]
pub enum SecurityDecision {
    /// Every scheme of the set passed.
    Allowed,
    /// A scheme denied; the error of the first denying scheme.
    Denied(PipeError),
}

impl SecurityDecision {
    /// Returns true for [`SecurityDecision::Allowed`].
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Extracts the scopes or API key a scheme handler receives.
///
/// OAuth2 schemes receive the scopes the requirement set lists. API key
/// schemes receive the key from the query string or from the header of the
/// declared name, looked up case-insensitively.
#[must_use]
pub fn scope_or_key(
    req: &PipeRequest,
    scheme: &SecurityScheme,
    scopes: &[String],
) -> Option<ScopeOrKey> {
    match scheme {
        SecurityScheme::OAuth2 { .. } => Some(ScopeOrKey::Scopes(scopes.to_vec())),
        SecurityScheme::ApiKey {
            name,
            location: ApiKeyLocation::Query,
        } => {
            let value = match req.query() {
                Some(query) => query.get(name).cloned(),
                None => req.parse_query_string().remove(name),
            }?;
            match value {
                Value::String(key) => Some(ScopeOrKey::Key(key)),
                Value::Array(values) => values
                    .into_iter()
                    .next()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .map(ScopeOrKey::Key),
                other => Some(ScopeOrKey::Key(other.to_string())),
            }
        }
        SecurityScheme::ApiKey {
            name,
            location: ApiKeyLocation::Header,
        } => req
            .header(&name.to_ascii_lowercase())
            .map(|key| ScopeOrKey::Key(key.to_string())),
        SecurityScheme::Basic => None,
    }
}

/// Evaluates operation security.
#[derive(Debug, Clone)]
pub struct SecurityFitting {
    spec: Arc<ApiSpec>,
    handlers: Arc<SecurityHandlers>,
}

impl SecurityFitting {
    /// Creates the fitting.
    #[must_use]
    pub fn new(spec: Arc<ApiSpec>, handlers: Arc<SecurityHandlers>) -> Self {
        Self { spec, handlers }
    }

    /// Evaluates the requirement sets against a request.
    ///
    /// Returns one decision per set, in declaration order. An empty list
    /// yields no decisions and counts as allowed.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, before any handler runs, when a
    /// scheme has no registered handler or no definition.
    pub async fn evaluate(
        &self,
        req: &PipeRequest,
        security: &[SecurityRequirement],
        response: &ResponseHandle,
    ) -> Result<Vec<SecurityDecision>, PipeError> {
        for name in security.iter().flat_map(|set| set.keys()) {
            if self.handlers.get(name).is_none() {
                return Err(PipeError::configuration(format!(
                    "Unknown security handler: {name}"
                )));
            }
            if self.spec.security_definition(name).is_none() {
                return Err(PipeError::configuration(format!(
                    "Unknown security definition: {name}"
                )));
            }
        }

        let sets = security
            .iter()
            .map(|requirement| self.evaluate_set(req, requirement, response));
        Ok(join_all(sets).await)
    }

    async fn evaluate_set(
        &self,
        req: &PipeRequest,
        requirement: &SecurityRequirement,
        response: &ResponseHandle,
    ) -> SecurityDecision {
        let checks = requirement
            .iter()
            .map(|(name, scopes)| self.check(req, name, scopes, response));
        let results = join_all(checks).await;

        match results.into_iter().find_map(Result::err) {
            Some(err) => SecurityDecision::Denied(err),
            None => SecurityDecision::Allowed,
        }
    }

    async fn check(
        &self,
        req: &PipeRequest,
        name: &str,
        scopes: &[String],
        response: &ResponseHandle,
    ) -> Result<(), PipeError> {
        let (Some(handler), Some(scheme)) =
            (self.handlers.get(name), self.spec.security_definition(name))
        else {
            return Err(PipeError::configuration(format!(
                "Unknown security handler: {name}"
            )));
        };

        let result = match handler {
            SecurityHandler::Scheme(check) => {
                check(req, scheme, scope_or_key(req, scheme, scopes)).await
            }
            SecurityHandler::RequestResponse(check) => check(req, response.clone()).await,
        };

        debug!(
            scheme = name,
            allowed = result.is_ok(),
            "security check"
        );
        result
    }
}

impl Fitting for SecurityFitting {
    fn name(&self) -> &str {
        SECURITY
    }

    fn run<'a>(&'a self, ctx: &'a mut ExchangeContext) -> BoxFuture<'a, FittingResult> {
        Box::pin(async move {
            let Some(operation) = ctx.request().operation().cloned() else {
                return Ok(None);
            };
            let security = operation.security();
            if security.is_empty() {
                return Ok(None);
            }

            let response = ResponseHandle::new(ctx.response().head().clone());
            let decisions = self.evaluate(ctx.request(), security, &response).await?;
            *ctx.response_mut().head_mut() = response.head();

            let allowed = decisions.iter().any(SecurityDecision::is_allowed);
            debug!(
                operation_id = operation.operation_id().unwrap_or_default(),
                allowed,
                "request security evaluated"
            );
            metrics::record_security_decision(allowed);

            if allowed {
                return Ok(None);
            }

            let mut err = decisions
                .into_iter()
                .find_map(|decision| match decision {
                    SecurityDecision::Denied(err) => Some(err),
                    SecurityDecision::Allowed => None,
                })
                .unwrap_or_else(|| PipeError::authorization("Access denied"));

            if err.code().is_none() {
                err.set_code("server_error");
            }
            if err.status().is_none() {
                err.set_status(StatusCode::FORBIDDEN);
            }

            let response = ctx.response_mut();
            for (name, value) in err.headers() {
                response.set_header(name.clone(), value.clone());
            }
            response.set_status(err.status_code());

            Err(err)
        })
    }
}

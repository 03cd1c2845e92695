//! The runner: startup and per-request dispatch.
//!
//! A [`Runner`] is built once from an [`ApiSpec`] and an
//! [`AqueductConfig`]. Building validates the configuration and the
//! document, constructs every configured pipe, and fails with a
//! [`RunnerError`](crate::RunnerError) rather than producing a runner that cannot serve.
//!
//! ```text
//! request → bind → select pipe → execute fittings → finalize → response
//!             │          │               │
//!          405/404   no pipe (405)   Failure (error envelope)
//! ```

use crate::binder::{self, Binding};
use crate::error::RunnerResult;
use crate::events::{ResponseValidationEvent, EVENT_CAPACITY};
use crate::finalize::finalize;
use crate::hook;
use aqueduct_config::{AqueductConfig, FittingDef, RunnerConfig};
use aqueduct_core::{ApiSpec, Container, PipeError, PipeRequest, PipeResponse, SetupError};
use aqueduct_middleware::{
    BodyParsers, ControllerLoader, ExchangeContext, FittingEnv, FittingRegistry, FnFitting, Pipe,
    PipeSelector, SecurityHandler, SecurityHandlers, SharedFitting,
};
use aqueduct_telemetry::metrics;
use bytes::Bytes;
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Builder for [`Runner`].
pub struct RunnerBuilder {
    spec: Arc<ApiSpec>,
    config: AqueductConfig,
    security_handlers: SecurityHandlers,
    controllers: Option<Arc<dyn ControllerLoader>>,
    dependencies: Container,
    fittings: FittingRegistry,
    body_parsers: BodyParsers,
}

impl RunnerBuilder {
    fn new(spec: impl Into<Arc<ApiSpec>>, config: AqueductConfig) -> Self {
        Self {
            spec: spec.into(),
            config,
            security_handlers: SecurityHandlers::new(),
            controllers: None,
            dependencies: Container::new(),
            fittings: FittingRegistry::with_system_fittings(),
            body_parsers: BodyParsers::default(),
        }
    }

    /// Registers the handler for a security scheme.
    #[must_use]
    pub fn security_handler(mut self, scheme: impl Into<String>, handler: SecurityHandler) -> Self {
        self.security_handlers.insert(scheme, handler);
        self
    }

    /// Sets the loader the router fittings resolve controllers with.
    #[must_use]
    pub fn controllers(mut self, loader: impl ControllerLoader) -> Self {
        self.controllers = Some(Arc::new(loader));
        self
    }

    /// Sets the dependencies handed to controller factories.
    #[must_use]
    pub fn dependencies(mut self, dependencies: Container) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Registers a user fitting type.
    #[must_use]
    pub fn fitting<F>(mut self, fitting_type: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&FittingDef, &FittingEnv) -> Result<SharedFitting, SetupError>
            + Send
            + Sync
            + 'static,
    {
        self.fittings.register(fitting_type, factory);
        self
    }

    /// Registers a user fitting type backed by a single instance.
    #[must_use]
    pub fn register_fitting(mut self, fitting_type: impl Into<String>, fitting: SharedFitting) -> Self {
        self.fittings.register_fitting(fitting_type, fitting);
        self
    }

    /// Replaces the body parsers used by the params parser fitting.
    #[must_use]
    pub fn body_parsers(mut self, parsers: BodyParsers) -> Self {
        self.body_parsers = parsers;
        self
    }

    /// Validates everything and builds the runner.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`](crate::RunnerError::Config) for an
    /// invalid configuration and [`RunnerError::Setup`](crate::RunnerError::Setup)
    /// when the document fails validation or a pipe cannot be built.
    pub fn build(self) -> RunnerResult<Runner> {
        self.config.validate()?;
        let config = self.config.with_default_pipes();
        metrics::describe_metrics();

        validate_spec(&self.spec, &config.runner)?;

        let mut env = FittingEnv::new(self.spec.clone());
        env.app_root = config.runner.app_root.clone();
        env.mock_mode = config.runner.mock_mode;
        env.security_handlers = Arc::new(self.security_handlers);
        if let Some(controllers) = self.controllers {
            env.controllers = controllers;
        }
        env.dependencies = self.dependencies;
        env.body_parsers = self.body_parsers;

        let pipes = self.fittings.build_pipes(&config, &env)?;
        let mut names: Vec<&str> = pipes.keys().map(String::as_str).collect();
        names.sort_unstable();
        info!(
            api = self.spec.title(),
            pipes = ?names,
            mock_mode = config.runner.mock_mode,
            "runner started"
        );

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Runner {
            spec: self.spec,
            selector: PipeSelector::from_config(pipes, &config.runner),
            events,
            error_handler: default_error_handler(),
        })
    }
}

fn validate_spec(spec: &ApiSpec, runner: &RunnerConfig) -> Result<(), SetupError> {
    let mut results = spec.validate();
    if !runner.enforce_unique_operation_id {
        results.errors.retain(|err| err.code != "DUPLICATE_OPERATIONID");
    }

    for err in &results.errors {
        error!(code = %err.code, path = %err.path, "{}", err.message);
    }
    for warning in &results.warnings {
        warn!(code = %warning.code, path = %warning.path, "{}", warning.message);
    }

    if results.has_errors() && !runner.start_with_errors {
        return Err(SetupError::InvalidSpec {
            errors: results.errors,
        });
    }
    if !results.warnings.is_empty() && !runner.start_with_warnings {
        return Err(SetupError::SpecWarnings {
            warnings: results.warnings,
        });
    }
    Ok(())
}

fn default_error_handler() -> SharedFitting {
    FnFitting::shared("defaultErrorHandler", |ctx| {
        Box::pin(async move {
            match ctx.take_error() {
                Some(err) => {
                    debug!(error = %err, "unhandled pipe error");
                    Err(err)
                }
                None => Ok(None),
            }
        })
    })
}

/// Serves requests bound to an API document through configured pipes.
pub struct Runner {
    spec: Arc<ApiSpec>,
    selector: PipeSelector,
    events: broadcast::Sender<ResponseValidationEvent>,
    error_handler: SharedFitting,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("api", &self.spec.title())
            .field("pipes", &self.selector.len())
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Starts building a runner.
    #[must_use]
    pub fn builder(spec: impl Into<Arc<ApiSpec>>, config: AqueductConfig) -> RunnerBuilder {
        RunnerBuilder::new(spec, config)
    }

    /// Returns the API document.
    #[must_use]
    pub fn spec(&self) -> &Arc<ApiSpec> {
        &self.spec
    }

    /// Returns a built pipe by name.
    #[must_use]
    pub fn pipe(&self, name: &str) -> Option<&Arc<Pipe>> {
        self.selector.pipe(name)
    }

    /// Subscribes to response validation findings.
    ///
    /// Responses are only validated while at least one receiver is alive.
    #[must_use]
    pub fn subscribe_response_validation(&self) -> broadcast::Receiver<ResponseValidationEvent> {
        self.events.subscribe()
    }

    /// Runs a request through its pipe.
    pub async fn dispatch(&self, mut req: PipeRequest) -> Dispatch {
        match binder::bind(&self.spec, &mut req) {
            Ok(Binding::Bound) => {}
            Ok(Binding::Unmatched) => return Dispatch::Unmatched(req),
            Err(err) => return Dispatch::Failed(Failure::new(err, PipeResponse::new())),
        }

        let Some(pipe) = self.selector.select(req.meta()) else {
            return Dispatch::Failed(Failure::new(no_pipe(&req), PipeResponse::new()));
        };

        let operation = req.operation().cloned();
        let mut response = PipeResponse::new();
        if self.events.receiver_count() > 0 {
            hook::install(&mut response, &req, &self.events);
        }

        let mut ctx = ExchangeContext::with_response(req, response)
            .with_error_handler(self.error_handler.clone());
        let result = pipe.execute(&mut ctx).await;
        let parts = ctx.into_parts();

        if let Err(err) = result {
            debug!(pipe = pipe.name(), error = %err, "pipe failed");
            return Dispatch::Failed(Failure::new(err, parts.response));
        }

        match finalize(parts, operation.as_deref()) {
            Ok(response) => Dispatch::Completed(response.into_http()),
            Err(err) => {
                error!(pipe = pipe.name(), error = %err, "failed to finalize response");
                Dispatch::Failed(Failure::new(err, PipeResponse::new()))
            }
        }
    }

    /// Runs an HTTP request and always produces a response.
    ///
    /// Requests for undeclared paths get a 404 envelope; failures are
    /// rendered with [`Failure::into_response`].
    pub async fn handle(&self, request: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        match self.dispatch(PipeRequest::from_http(request)).await {
            Dispatch::Completed(response) => response,
            Dispatch::Failed(failure) => failure.into_response(),
            Dispatch::Unmatched(req) => {
                let err = PipeError::routing(format!("No path matches {}", req.path()))
                    .with_status(StatusCode::NOT_FOUND)
                    .with_code("not_found");
                Failure::new(err, PipeResponse::new()).into_response()
            }
        }
    }
}

fn no_pipe(req: &PipeRequest) -> PipeError {
    let err = PipeError::routing("No implementation found for this path.");
    let Some(path) = req.meta().path.as_deref() else {
        return err;
    };
    let allowed = path.allowed_methods();
    let err = match HeaderValue::from_str(&allowed.join(", ")) {
        Ok(value) => err.with_header(ALLOW, value),
        Err(_) => err,
    };
    err.with_allowed_methods(allowed)
}

/// The outcome of [`Runner::dispatch`].
#[derive(Debug)]
pub enum Dispatch {
    /// No declared path matches; the request is handed back.
    Unmatched(PipeRequest),
    /// The pipe completed and the response is final.
    Completed(http::Response<Full<Bytes>>),
    /// The request failed.
    Failed(Failure),
}

/// A failed request: the error and the response accumulated before it.
#[derive(Debug)]
pub struct Failure {
    error: PipeError,
    response: PipeResponse,
}

impl Failure {
    fn new(error: PipeError, response: PipeResponse) -> Self {
        Self { error, response }
    }

    /// Returns the error.
    #[must_use]
    pub fn error(&self) -> &PipeError {
        &self.error
    }

    /// Returns the response accumulated before the failure.
    #[must_use]
    pub fn response(&self) -> &PipeResponse {
        &self.response
    }

    /// Renders the failure.
    ///
    /// A response already ended by a handler is sent as it is. Otherwise the
    /// error's status and headers are applied over the accumulated headers
    /// and the body is the JSON error envelope.
    #[must_use]
    pub fn into_response(self) -> http::Response<Full<Bytes>> {
        let Self { error, mut response } = self;
        if response.is_ended() {
            return response.into_http();
        }

        response.set_status(error.status_code());
        for (name, value) in error.headers() {
            response.set_header(name.clone(), value.clone());
        }
        response.set_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = serde_json::to_vec(&error.to_envelope()).map_or_else(
            |e| {
                warn!(error = %e, "failed to serialize error envelope");
                Bytes::from_static(br#"{"error":{"message":"Internal Server Error"}}"#)
            },
            Bytes::from,
        );
        response.end(Some(body));
        response.into_http()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqueduct_core::fixtures::petstore_spec;
    use aqueduct_core::ErrorCategory;
    use http::{Method, Uri};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};

    fn runner(config: AqueductConfig) -> Runner {
        Runner::builder(petstore_spec(), config).build().unwrap()
    }

    fn get(uri: &'static str) -> PipeRequest {
        PipeRequest::new(Method::GET, Uri::from_static(uri))
    }

    #[tokio::test]
    async fn test_default_pipes_are_built() {
        let runner = runner(AqueductConfig::default());
        assert!(runner.pipe("swagger_controllers").is_some());
        assert_eq!(runner.spec().title(), petstore_spec().title());
    }

    #[tokio::test]
    async fn test_unmatched_request_is_handed_back() {
        let runner = runner(AqueductConfig::default());
        match runner.dispatch(get("/owners")).await {
            Dispatch::Unmatched(req) => assert_eq!(req.path(), "/owners"),
            other => panic!("expected unmatched, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_path_without_pipe_is_routing_failure() {
        let runner = runner(AqueductConfig::default());
        let Dispatch::Failed(failure) = runner.dispatch(get("/health")).await else {
            panic!("expected failure");
        };
        assert_eq!(failure.error().category(), ErrorCategory::Routing);
        assert_eq!(failure.error().message(), "No implementation found for this path.");
        assert_eq!(failure.error().allowed_methods(), ["GET"]);
    }

    #[tokio::test]
    async fn test_failure_renders_envelope_with_headers() {
        let err = PipeError::routing("nope")
            .with_header(ALLOW, HeaderValue::from_static("GET, POST"))
            .with_code("method_not_allowed");
        let response = Failure::new(err, PipeResponse::new()).into_response();

        let (parts, body) = response.into_parts();
        assert_eq!(parts.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(parts.headers[ALLOW], "GET, POST");
        assert_eq!(parts.headers[CONTENT_TYPE], "application/json");

        let body = body.collect().await.unwrap().to_bytes();
        let envelope: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope["error"]["code"], json!("method_not_allowed"));
        assert_eq!(envelope["error"]["message"], json!("nope"));
    }

    #[tokio::test]
    async fn test_ended_failure_response_is_kept() {
        let mut response = PipeResponse::new();
        response.set_status(StatusCode::FOUND);
        response.end(None);

        let rendered = Failure::new(PipeError::authorization("redirected"), response).into_response();
        assert_eq!(rendered.status(), StatusCode::FOUND);
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let config = AqueductConfig::builder()
            .pipe("broken", ["missing_fitting"])
            .build();
        let err = Runner::builder(petstore_spec(), config).build().unwrap_err();
        assert!(matches!(
            err,
            crate::RunnerError::Setup(SetupError::UnknownFitting { .. })
        ));
    }
}

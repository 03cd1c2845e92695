//! The `swagger_router` fitting.
//!
//! Dispatches a bound operation to its controller handler, or serves a mock
//! response when running in mock mode.

use crate::context::ExchangeContext;
use crate::controller::{ControllerLoader, ControllerResolver, OperationHandler};
use crate::fitting::{BoxFuture, Fitting, FittingResult};
use aqueduct_core::{ApiSpec, Container, InterfaceStyle, Operation, PipeError, Schema};
use dashmap::DashMap;
use http::header::ACCEPT;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fitting type name.
pub const ROUTER: &str = "swagger_router";

/// Request header selecting the status code of a mock response.
pub const MOCK_STATUS_HEADER: &str = "_mockreturnstatus";

/// What to do in mock mode when a controller lacks the operation's handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingHandler {
    /// Serve a mock response.
    #[default]
    Mock,
    /// Fail the request.
    Error,
}

/// Options of a `swagger_router` fitting definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterOptions {
    /// Directories searched for controllers, relative to the app root.
    pub controllers_dirs: Vec<String>,

    /// Directories searched in mock mode.
    pub mock_controllers_dirs: Vec<String>,

    /// Interface style used when neither the operation, its path, nor the
    /// document declares one.
    pub controllers_interface: InterfaceStyle,

    /// Serve mocks. Also enabled by the runner's mock mode.
    pub mock_mode: bool,

    /// Missing handler policy in mock mode.
    pub missing_handler: MissingHandler,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            controllers_dirs: vec!["api/controllers".to_string()],
            mock_controllers_dirs: vec!["api/mocks".to_string()],
            controllers_interface: InterfaceStyle::Middleware,
            mock_mode: false,
            missing_handler: MissingHandler::Mock,
        }
    }
}

/// Routes requests to controller handlers.
#[derive(Debug)]
pub struct RouterFitting {
    spec: Arc<ApiSpec>,
    resolver: ControllerResolver,
    default_interface: InterfaceStyle,
    mock_mode: bool,
    missing_handler: MissingHandler,
    interfaces: DashMap<String, InterfaceStyle>,
    detections: AtomicUsize,
}

impl RouterFitting {
    /// Creates a router.
    ///
    /// Controller directories are resolved against `app_root`; the mock
    /// directories are searched instead when mock mode is on.
    #[must_use]
    pub fn new(
        spec: Arc<ApiSpec>,
        options: RouterOptions,
        app_root: &Path,
        loader: Arc<dyn ControllerLoader>,
        dependencies: Container,
    ) -> Self {
        let mock_mode = options.mock_mode;
        let dirs = if mock_mode {
            &options.mock_controllers_dirs
        } else {
            &options.controllers_dirs
        };
        let dirs = dirs.iter().map(|dir| app_root.join(dir)).collect();

        Self {
            spec,
            resolver: ControllerResolver::new(loader, dirs, dependencies, mock_mode),
            default_interface: options.controllers_interface,
            mock_mode,
            missing_handler: options.missing_handler,
            interfaces: DashMap::new(),
            detections: AtomicUsize::new(0),
        }
    }

    /// Returns true if the router serves mocks.
    #[must_use]
    pub fn is_mock_mode(&self) -> bool {
        self.mock_mode
    }

    /// Returns the controller resolver.
    #[must_use]
    pub fn resolver(&self) -> &ControllerResolver {
        &self.resolver
    }

    /// Returns how many operations had their interface style auto-detected.
    #[must_use]
    pub fn detection_count(&self) -> usize {
        self.detections.load(Ordering::SeqCst)
    }

    /// Returns the declared interface style of an operation: the operation
    /// first, then its path, then the document, then the router default.
    #[must_use]
    pub fn declared_interface(&self, operation: &Operation) -> InterfaceStyle {
        operation
            .interface()
            .or_else(|| self.spec.interface())
            .unwrap_or(self.default_interface)
    }

    fn interface_for(&self, operation: &Operation, handler: &OperationHandler) -> InterfaceStyle {
        let key = operation.key();
        if let Some(style) = self.interfaces.get(&key).map(|entry| *entry.value()) {
            return style;
        }

        let declared = self.declared_interface(operation);
        if declared != InterfaceStyle::AutoDetect {
            return declared;
        }

        *self
            .interfaces
            .entry(key)
            .or_insert_with(|| {
                let detected = handler.detected_style();
                self.detections.fetch_add(1, Ordering::SeqCst);
                debug!(operation = %operation.key(), arity = handler.arity(), interface = %detected, "interface detected");
                detected
            })
            .value()
    }

    async fn invoke(
        &self,
        ctx: &mut ExchangeContext,
        operation: &Operation,
        handler_name: &str,
        handler: OperationHandler,
    ) -> FittingResult {
        let style = self.interface_for(operation, &handler);
        debug!(handler = handler_name, interface = %style, "invoking handler");

        match (style, handler) {
            (InterfaceStyle::Pipe, OperationHandler::Contextual(handler)) => handler(ctx).await,
            (InterfaceStyle::Middleware, OperationHandler::RequestResponse(handler)) => {
                let (req, res) = ctx.split_mut();
                handler(req, res).await
            }
            (style, handler) => Err(PipeError::configuration(format!(
                "Handler {handler_name} takes {} arguments but operation {} uses the {style} interface",
                handler.arity(),
                operation.key()
            ))),
        }
    }

    /// Produces a mock response for the operation.
    ///
    /// The status comes from the `_mockreturnstatus` request header (200 by
    /// default) and the media type from `accept` (`application/json` by
    /// default). The body is the declared example for that media type,
    /// else a sample of the response schema, else nothing.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the operation declares neither the
    /// requested status nor a `default` response.
    pub fn mock(&self, ctx: &mut ExchangeContext, operation: &Operation) -> FittingResult {
        let status = ctx
            .request()
            .header(MOCK_STATUS_HEADER)
            .and_then(|value| value.trim().parse::<u16>().ok())
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::OK);
        let mimetype = ctx
            .request()
            .header(ACCEPT.as_str())
            .filter(|accept| !accept.trim().is_empty())
            .unwrap_or("application/json")
            .to_string();

        let Some(response) = operation.response_for(status.as_u16()) else {
            return Err(PipeError::configuration(format!(
                "Operation {} declares no '{}' or 'default' response to mock",
                operation.key(),
                status.as_u16()
            )));
        };

        let mock = response
            .example_for(&mimetype)
            .cloned()
            .or_else(|| response.body_schema().map(Schema::sample));

        debug!(status = status.as_u16(), mimetype = %mimetype, has_body = mock.is_some(), "serving mock");

        ctx.set_header("Content-Type", &mimetype)?;
        ctx.set_status_code(status);
        if mock.is_none() {
            ctx.take_output();
        }
        Ok(mock)
    }
}

impl Fitting for RouterFitting {
    fn name(&self) -> &str {
        ROUTER
    }

    fn run<'a>(&'a self, ctx: &'a mut ExchangeContext) -> BoxFuture<'a, FittingResult> {
        Box::pin(async move {
            let Some(operation) = ctx.request().operation().cloned() else {
                return Err(PipeError::configuration("No operation bound to the request"));
            };

            let controller_name = operation.controller().map(str::to_string);
            let controller = match controller_name.as_deref() {
                Some(name) => self
                    .resolver
                    .resolve(name)
                    .map_err(|err| PipeError::configuration(err.to_string()))?,
                None => None,
            };

            if let (Some(name), Some(controller)) = (controller_name.as_deref(), controller) {
                let handler_name = operation.operation_id().map_or_else(
                    || ctx.request().method().as_str().to_ascii_lowercase(),
                    str::to_string,
                );

                match controller.handler(&handler_name) {
                    Some(handler) => {
                        return self
                            .invoke(ctx, &operation, &handler_name, handler.clone())
                            .await;
                    }
                    None => {
                        let message =
                            format!("Controller {name} doesn't export handler function {handler_name}");
                        if self.mock_mode && self.missing_handler == MissingHandler::Mock {
                            debug!("{message}, serving mock");
                        } else {
                            warn!("{message}");
                            return Err(PipeError::configuration(message));
                        }
                    }
                }
            }

            if self.mock_mode {
                return self.mock(ctx, &operation);
            }

            Err(PipeError::configuration(format!(
                "No controller found for {} in {:?}",
                controller_name.as_deref().unwrap_or("<none>"),
                self.resolver.dirs()
            )))
        })
    }
}

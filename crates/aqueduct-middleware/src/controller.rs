//! Controllers and their resolution.
//!
//! A [`Controller`] maps operation ids to [`OperationHandler`]s. Controllers
//! are obtained from a [`ControllerLoader`] by path (`{directory}/{name}`)
//! and cached by name by the [`ControllerResolver`] for its whole lifetime.

use crate::context::ExchangeContext;
use crate::fitting::{BoxFuture, FittingResult};
use aqueduct_core::{Container, InterfaceStyle, PipeRequest, PipeResponse};
use aqueduct_telemetry::metrics;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Future returned by operation handlers.
pub type HandlerFuture<'a> = BoxFuture<'a, FittingResult>;

type ContextualFn = Arc<dyn for<'a> Fn(&'a mut ExchangeContext) -> HandlerFuture<'a> + Send + Sync>;

type RequestResponseFn =
    Arc<dyn for<'a> Fn(&'a PipeRequest, &'a mut PipeResponse) -> HandlerFuture<'a> + Send + Sync>;

/// An operation handler in one of the two calling conventions.
///
/// The convention a handler is written in must match the interface style
/// resolved for its operation.
#[derive(Clone)]
pub enum OperationHandler {
    /// Receives the exchange context (`pipe` interface).
    Contextual(ContextualFn),
    /// Receives the request and the response (`middleware` interface).
    RequestResponse(RequestResponseFn),
}

impl fmt::Debug for OperationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contextual(_) => f.write_str("OperationHandler::Contextual"),
            Self::RequestResponse(_) => f.write_str("OperationHandler::RequestResponse"),
        }
    }
}

impl OperationHandler {
    /// Creates a handler that receives the exchange context.
    pub fn contextual<F>(handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut ExchangeContext) -> HandlerFuture<'a> + Send + Sync + 'static,
    {
        Self::Contextual(Arc::new(handler))
    }

    /// Creates a handler that receives the request and the response.
    pub fn request_response<F>(handler: F) -> Self
    where
        F: for<'a> Fn(&'a PipeRequest, &'a mut PipeResponse) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        Self::RequestResponse(Arc::new(handler))
    }

    /// Returns the number of arguments of the handler, counting the
    /// completion callback of the classic signatures: 2 for contextual
    /// handlers, 3 for request/response handlers.
    #[must_use]
    pub const fn arity(&self) -> usize {
        match self {
            Self::Contextual(_) => 2,
            Self::RequestResponse(_) => 3,
        }
    }

    /// Classifies the handler by arity: three arguments means the
    /// `middleware` interface, anything else the `pipe` interface.
    #[must_use]
    pub const fn detected_style(&self) -> InterfaceStyle {
        if self.arity() == 3 {
            InterfaceStyle::Middleware
        } else {
            InterfaceStyle::Pipe
        }
    }
}

/// Operation handlers by operation id.
///
/// # Example
///
/// ```
/// use aqueduct_middleware::controller::{Controller, OperationHandler};
/// use serde_json::json;
///
/// let controller = Controller::new().with(
///     "listPets",
///     OperationHandler::contextual(|_ctx| Box::pin(async { Ok(Some(json!([]))) })),
/// );
/// assert!(controller.handler("listPets").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Controller {
    handlers: HashMap<String, OperationHandler>,
}

impl Controller {
    /// Creates an empty controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler (builder style).
    #[must_use]
    pub fn with(mut self, operation_id: impl Into<String>, handler: OperationHandler) -> Self {
        self.insert(operation_id, handler);
        self
    }

    /// Adds a handler.
    pub fn insert(&mut self, operation_id: impl Into<String>, handler: OperationHandler) {
        self.handlers.insert(operation_id.into(), handler);
    }

    /// Returns the handler for an operation id.
    #[must_use]
    pub fn handler(&self, operation_id: &str) -> Option<&OperationHandler> {
        self.handlers.get(operation_id)
    }

    /// Returns the number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if the controller has no handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Builds a controller from the runner's dependencies.
pub type ControllerFactory =
    Arc<dyn Fn(&Container) -> Result<Controller, anyhow::Error> + Send + Sync>;

/// What a loader returns: a ready controller or a factory for one.
#[derive(Clone)]
pub enum ControllerModule {
    /// A ready controller.
    Object(Arc<Controller>),
    /// A factory invoked with the dependency container.
    Factory(ControllerFactory),
}

impl fmt::Debug for ControllerModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(controller) => f.debug_tuple("Object").field(controller).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

impl From<Controller> for ControllerModule {
    fn from(controller: Controller) -> Self {
        Self::Object(Arc::new(controller))
    }
}

impl ControllerModule {
    /// Creates a factory module.
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&Container) -> Result<Controller, anyhow::Error> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(factory))
    }

    /// Produces the controller, invoking the factory if there is one.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError::Factory` if the factory fails.
    pub fn instantiate(
        &self,
        path: &Path,
        dependencies: &Container,
    ) -> Result<Arc<Controller>, ControllerError> {
        match self {
            Self::Object(controller) => Ok(controller.clone()),
            Self::Factory(factory) => factory(dependencies).map(Arc::new).map_err(|source| {
                ControllerError::Factory {
                    path: path.display().to_string(),
                    source,
                }
            }),
        }
    }
}

/// Errors raised while loading a controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Nothing is registered at the path.
    #[error("Cannot find controller '{path}'")]
    NotFound {
        /// The searched path.
        path: String,
    },

    /// The controller factory failed.
    #[error("controller factory '{path}' failed: {source}")]
    Factory {
        /// The controller path.
        path: String,
        /// The factory's error.
        #[source]
        source: anyhow::Error,
    },
}

/// Loads controller modules by path.
pub trait ControllerLoader: Send + Sync + 'static {
    /// Loads the module at `path` (`{directory}/{controller}`).
    fn load(&self, path: &Path) -> Result<ControllerModule, ControllerError>;
}

/// A loader over statically registered modules.
///
/// Paths are compared after lexical normalization, so `./api/controllers/pets`
/// and `api/controllers/pets` are the same key.
///
/// ```
/// use aqueduct_middleware::controller::{Controller, ControllerLoader, ControllerRegistry};
/// use std::path::Path;
///
/// let registry = ControllerRegistry::new().with("api/controllers/pets", Controller::new());
/// assert!(registry.load(Path::new("./api/controllers/pets")).is_ok());
/// assert!(registry.load(Path::new("api/mocks/pets")).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ControllerRegistry {
    modules: HashMap<PathBuf, ControllerModule>,
}

impl ControllerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module (builder style).
    #[must_use]
    pub fn with(mut self, path: impl AsRef<Path>, module: impl Into<ControllerModule>) -> Self {
        self.register(path, module);
        self
    }

    /// Registers a module at `path`.
    pub fn register(&mut self, path: impl AsRef<Path>, module: impl Into<ControllerModule>) {
        self.modules
            .insert(normalize_path(path.as_ref()), module.into());
    }

    /// Returns the number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ControllerLoader for ControllerRegistry {
    fn load(&self, path: &Path) -> Result<ControllerModule, ControllerError> {
        self.modules
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| ControllerError::NotFound {
                path: path.display().to_string(),
            })
    }
}

/// Lexically normalizes a path: drops `.` components and folds `..`.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Finds controllers across directories and caches them by name.
pub struct ControllerResolver {
    loader: Arc<dyn ControllerLoader>,
    dirs: Vec<PathBuf>,
    dependencies: Container,
    mock_mode: bool,
    cache: DashMap<String, Arc<Controller>>,
}

impl fmt::Debug for ControllerResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerResolver")
            .field("dirs", &self.dirs)
            .field("mock_mode", &self.mock_mode)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl ControllerResolver {
    /// Creates a resolver searching `dirs` in order.
    ///
    /// In mock mode a controller that cannot be loaded is not an error.
    #[must_use]
    pub fn new(
        loader: Arc<dyn ControllerLoader>,
        dirs: Vec<PathBuf>,
        dependencies: Container,
        mock_mode: bool,
    ) -> Self {
        Self {
            loader,
            dirs,
            dependencies,
            mock_mode,
            cache: DashMap::new(),
        }
    }

    /// Returns the searched directories.
    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Returns the number of cached controllers.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Resolves a controller by name.
    ///
    /// Cached controllers are returned without touching the loader.
    /// Otherwise each directory is tried in order and the first success is
    /// cached. Concurrent first resolutions of one name converge on a
    /// single cached entry.
    ///
    /// Returns `Ok(None)` when nothing loads in mock mode.
    ///
    /// # Errors
    ///
    /// Returns the last load error when nothing loads outside mock mode.
    pub fn resolve(&self, name: &str) -> Result<Option<Arc<Controller>>, ControllerError> {
        if let Some(controller) = self.cache.get(name) {
            debug!(controller = name, "controller in cache");
            return Ok(Some(Arc::clone(controller.value())));
        }

        let mut last_error = None;
        for dir in &self.dirs {
            let path = dir.join(name);
            let loaded = self
                .loader
                .load(&path)
                .and_then(|module| module.instantiate(&path, &self.dependencies));

            match loaded {
                Ok(controller) => {
                    debug!(controller = name, path = %path.display(), "controller found");
                    metrics::record_controller_load(name, true);
                    let entry = self.cache.entry(name.to_string()).or_insert(controller);
                    return Ok(Some(Arc::clone(entry.value())));
                }
                Err(err) => {
                    debug!(controller = name, path = %path.display(), error = %err, "controller not in");
                    last_error = Some(err);
                }
            }
        }

        metrics::record_controller_load(name, false);
        match last_error {
            Some(err) if !self.mock_mode => Err(err),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        inner: ControllerRegistry,
        loads: AtomicUsize,
    }

    impl ControllerLoader for CountingLoader {
        fn load(&self, path: &Path) -> Result<ControllerModule, ControllerError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load(path)
        }
    }

    fn pets() -> Controller {
        Controller::new().with(
            "listPets",
            OperationHandler::contextual(|_ctx| Box::pin(async { Ok(Some(json!([]))) })),
        )
    }

    fn dirs() -> Vec<PathBuf> {
        vec![
            PathBuf::from("./api/first"),
            PathBuf::from("./api/second"),
            PathBuf::from("./api/third"),
        ]
    }

    #[test]
    fn test_second_directory_is_cached() {
        let loader = Arc::new(CountingLoader {
            inner: ControllerRegistry::new().with("api/second/pets", pets()),
            loads: AtomicUsize::new(0),
        });
        let resolver = ControllerResolver::new(loader.clone(), dirs(), Container::new(), false);

        let first = resolver.resolve("pets").unwrap().unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);

        let second = resolver.resolve("pets").unwrap().unwrap();
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.cached(), 1);
    }

    #[test]
    fn test_concurrent_first_resolution_converges() {
        const THREADS: usize = 8;

        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let module = ControllerModule::factory(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(pets())
        });
        let registry = ControllerRegistry::new().with("api/first/pets", module);
        let resolver = ControllerResolver::new(Arc::new(registry), dirs(), Container::new(), false);
        let barrier = std::sync::Barrier::new(THREADS);

        let resolved: Vec<Arc<Controller>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        resolver.resolve("pets").unwrap().unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert!(builds.load(Ordering::SeqCst) >= 1);
        assert!(resolved.iter().all(|controller| Arc::ptr_eq(controller, &resolved[0])));
        assert_eq!(resolver.cached(), 1);

        let again = resolver.resolve("pets").unwrap().unwrap();
        assert!(Arc::ptr_eq(&again, &resolved[0]));
    }

    #[test]
    fn test_last_error_surfaces() {
        let resolver = ControllerResolver::new(
            Arc::new(ControllerRegistry::new()),
            dirs(),
            Container::new(),
            false,
        );
        let err = resolver.resolve("pets").unwrap_err();
        assert!(err.to_string().contains("api/third/pets"), "{err}");
    }

    #[test]
    fn test_mock_mode_tolerates_missing_controller() {
        let resolver = ControllerResolver::new(
            Arc::new(ControllerRegistry::new()),
            dirs(),
            Container::new(),
            true,
        );
        assert!(resolver.resolve("pets").unwrap().is_none());
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_factory_receives_dependencies() {
        struct Greeting(&'static str);

        let mut deps = Container::new();
        deps.register(Arc::new(Greeting("hello")));

        let module = ControllerModule::factory(|deps| {
            let greeting = deps.resolve_required::<Greeting>()?;
            Ok(Controller::new().with(
                greeting.0,
                OperationHandler::contextual(|_ctx| Box::pin(async { Ok(None) })),
            ))
        });
        let registry = ControllerRegistry::new().with("api/first/greeter", module);
        let resolver = ControllerResolver::new(Arc::new(registry), dirs(), deps, false);

        let controller = resolver.resolve("greeter").unwrap().unwrap();
        assert!(controller.handler("hello").is_some());
    }

    #[test]
    fn test_failing_factory() {
        let module = ControllerModule::factory(|_| Err(anyhow::anyhow!("no database")));
        let registry = ControllerRegistry::new().with("api/third/broken", module);
        let resolver = ControllerResolver::new(Arc::new(registry), dirs(), Container::new(), false);

        let err = resolver.resolve("broken").unwrap_err();
        assert!(matches!(err, ControllerError::Factory { .. }));
    }

    #[test]
    fn test_handler_arity() {
        let contextual = OperationHandler::contextual(|_ctx| Box::pin(async { Ok(None) }));
        let request_response =
            OperationHandler::request_response(|_req, _res| Box::pin(async { Ok(None) }));
        assert_eq!(contextual.arity(), 2);
        assert_eq!(contextual.detected_style(), InterfaceStyle::Pipe);
        assert_eq!(request_response.arity(), 3);
        assert_eq!(request_response.detected_style(), InterfaceStyle::Middleware);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("./a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize_path(Path::new("/srv/app/./api")), PathBuf::from("/srv/app/api"));
    }
}

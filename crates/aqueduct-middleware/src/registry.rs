//! Fitting registry and pipe construction.
//!
//! Fitting types are registered by name with a factory. Pipes are built from
//! the configuration once at startup: every step name resolves to a fitting
//! definition, another pipe (inlined), or a registered type.

use crate::controller::{ControllerLoader, ControllerRegistry};
use crate::fitting::SharedFitting;
use crate::fittings::{
    ParamsParserFitting, RouterFitting, RouterOptions, SecurityFitting, SecurityHandlers,
    ValidatorFitting, PARAMS_PARSER, ROUTER, SECURITY, VALIDATOR,
};
use crate::parsers::{BodyParsers, JsonParser, TextParser, TypeMatcher, UrlencodedParser};
use crate::pipeline::Pipe;
use aqueduct_config::{AqueductConfig, FittingDef, PipeStep};
use aqueduct_core::{ApiSpec, Container, SetupError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Creates a fitting from its definition.
pub type FittingFactory =
    Arc<dyn Fn(&FittingDef, &FittingEnv) -> Result<SharedFitting, SetupError> + Send + Sync>;

/// Everything a fitting factory may need.
#[derive(Clone)]
pub struct FittingEnv {
    /// The API document.
    pub spec: Arc<ApiSpec>,
    /// Root that controller directories are relative to.
    pub app_root: PathBuf,
    /// Runner-wide mock mode.
    pub mock_mode: bool,
    /// Security handlers by scheme name.
    pub security_handlers: Arc<SecurityHandlers>,
    /// Controller loader.
    pub controllers: Arc<dyn ControllerLoader>,
    /// Dependencies handed to controller factories.
    pub dependencies: Container,
    /// Default body parsers.
    pub body_parsers: BodyParsers,
}

impl fmt::Debug for FittingEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FittingEnv")
            .field("spec", &self.spec.title())
            .field("app_root", &self.app_root)
            .field("mock_mode", &self.mock_mode)
            .field("security_handlers", &self.security_handlers.len())
            .field("dependencies", &self.dependencies)
            .field("body_parsers", &self.body_parsers)
            .finish_non_exhaustive()
    }
}

impl FittingEnv {
    /// Creates an environment with no handlers, controllers or
    /// dependencies.
    #[must_use]
    pub fn new(spec: Arc<ApiSpec>) -> Self {
        Self {
            spec,
            app_root: PathBuf::from("."),
            mock_mode: false,
            security_handlers: Arc::new(SecurityHandlers::new()),
            controllers: Arc::new(ControllerRegistry::new()),
            dependencies: Container::new(),
            body_parsers: BodyParsers::default(),
        }
    }
}

/// Fitting factories by type name.
#[derive(Clone, Default)]
pub struct FittingRegistry {
    factories: HashMap<String, FittingFactory>,
}

impl fmt::Debug for FittingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("FittingRegistry").field("types", &types).finish()
    }
}

impl FittingRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the system fitting types.
    #[must_use]
    pub fn with_system_fittings() -> Self {
        let mut registry = Self::new();
        registry.register(PARAMS_PARSER, |def, env| {
            Ok(Arc::new(params_parser(def, env)?) as SharedFitting)
        });
        registry.register(SECURITY, |_def, env| {
            Ok(Arc::new(SecurityFitting::new(
                env.spec.clone(),
                env.security_handlers.clone(),
            )) as SharedFitting)
        });
        registry.register(VALIDATOR, |_def, _env| Ok(Arc::new(ValidatorFitting) as SharedFitting));
        registry.register(ROUTER, |def, env| Ok(Arc::new(router(def, env)?) as SharedFitting));
        registry
    }

    /// Registers a fitting type.
    pub fn register<F>(&mut self, fitting_type: impl Into<String>, factory: F)
    where
        F: Fn(&FittingDef, &FittingEnv) -> Result<SharedFitting, SetupError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(fitting_type.into(), Arc::new(factory));
    }

    /// Registers a fitting type whose every definition shares one instance.
    pub fn register_fitting(&mut self, fitting_type: impl Into<String>, fitting: SharedFitting) {
        self.register(fitting_type, move |_def, _env| Ok(fitting.clone()));
    }

    /// Returns true if the type is registered.
    #[must_use]
    pub fn contains(&self, fitting_type: &str) -> bool {
        self.factories.contains_key(fitting_type)
    }

    /// Creates a fitting from a definition.
    ///
    /// # Errors
    ///
    /// Returns `SetupError::UnknownFittingType` if the definition's type is
    /// not registered, or the factory's error.
    pub fn create(
        &self,
        definition: &str,
        def: &FittingDef,
        env: &FittingEnv,
    ) -> Result<SharedFitting, SetupError> {
        let factory = self
            .factories
            .get(&def.name)
            .ok_or_else(|| SetupError::UnknownFittingType {
                definition: definition.to_string(),
                fitting_type: def.name.clone(),
            })?;
        factory(def, env)
    }

    /// Builds every configured pipe.
    ///
    /// A step naming a fitting definition uses that definition; a step
    /// naming another pipe inlines its steps; a step naming a registered
    /// type creates it with no options. Fittings are created once per name
    /// and shared between pipes. The last `on_error` step of a pipe wins.
    ///
    /// # Errors
    ///
    /// Returns `SetupError::PipeCycle` for pipes that include themselves,
    /// `SetupError::UnknownFitting` for unresolvable steps, and any
    /// factory error.
    pub fn build_pipes(
        &self,
        config: &AqueductConfig,
        env: &FittingEnv,
    ) -> Result<HashMap<String, Arc<Pipe>>, SetupError> {
        let mut instances = HashMap::new();
        let mut pipes = HashMap::new();

        for name in config.pipes.keys() {
            let mut steps = Vec::new();
            expand_pipe(config, name, &mut Vec::new(), &mut steps)?;

            let mut builder = Pipe::builder(name.as_str());
            for step in &steps {
                let fitting = self.instance(config, env, step.target(), name, &mut instances)?;
                builder = match step {
                    PipeStep::Fitting(_) => builder.fitting(fitting),
                    PipeStep::OnError { .. } => builder.on_error(fitting),
                };
            }

            let pipe = builder.build();
            debug!(pipe = %name, fittings = ?pipe.fitting_names(), "pipe built");
            pipes.insert(name.clone(), Arc::new(pipe));
        }

        Ok(pipes)
    }

    fn instance(
        &self,
        config: &AqueductConfig,
        env: &FittingEnv,
        target: &str,
        pipe: &str,
        instances: &mut HashMap<String, SharedFitting>,
    ) -> Result<SharedFitting, SetupError> {
        if let Some(fitting) = instances.get(target) {
            return Ok(fitting.clone());
        }

        let fitting = if let Some(def) = config.fittings.get(target) {
            self.create(target, def, env)?
        } else if let Some(factory) = self.factories.get(target) {
            factory(&FittingDef::new(target), env)?
        } else {
            return Err(SetupError::UnknownFitting {
                fitting: target.to_string(),
                pipe: pipe.to_string(),
            });
        };

        debug!(fitting = target, "fitting created");
        instances.insert(target.to_string(), fitting.clone());
        Ok(fitting)
    }
}

fn expand_pipe(
    config: &AqueductConfig,
    pipe: &str,
    stack: &mut Vec<String>,
    out: &mut Vec<PipeStep>,
) -> Result<(), SetupError> {
    if stack.iter().any(|p| p == pipe) {
        return Err(SetupError::PipeCycle {
            pipe: pipe.to_string(),
        });
    }
    let Some(steps) = config.pipes.get(pipe) else {
        return Ok(());
    };

    stack.push(pipe.to_string());
    for step in steps {
        match step {
            PipeStep::Fitting(target)
                if !config.fittings.contains_key(target) && config.pipes.contains_key(target) =>
            {
                expand_pipe(config, target, stack, out)?;
            }
            other => out.push(other.clone()),
        }
    }
    stack.pop();
    Ok(())
}

fn options<T: DeserializeOwned>(def: &FittingDef) -> Result<T, SetupError> {
    serde_json::from_value(Value::Object(def.options.clone()))
        .map_err(|e| SetupError::invalid_options(def.name.as_str(), e.to_string()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ParamsParserOptions {
    urlencoded_types: Option<Vec<String>>,
    json_types: Option<Vec<String>>,
    text_types: Option<Vec<String>>,
}

fn params_parser(def: &FittingDef, env: &FittingEnv) -> Result<ParamsParserFitting, SetupError> {
    let opts: ParamsParserOptions = options(def)?;
    let mut parsers = env.body_parsers.clone();
    if let Some(types) = opts.urlencoded_types {
        parsers.urlencoded = Arc::new(UrlencodedParser::with_matcher(TypeMatcher::Types(types)));
    }
    if let Some(types) = opts.json_types {
        parsers.json = Arc::new(JsonParser::with_matcher(TypeMatcher::Types(types)));
    }
    if let Some(types) = opts.text_types {
        parsers.text = Arc::new(TextParser::with_matcher(TypeMatcher::Types(types)));
    }
    Ok(ParamsParserFitting::with_parsers(parsers))
}

fn router(def: &FittingDef, env: &FittingEnv) -> Result<RouterFitting, SetupError> {
    let mut opts: RouterOptions = options(def)?;
    opts.mock_mode |= env.mock_mode;
    Ok(RouterFitting::new(
        env.spec.clone(),
        opts,
        &env.app_root,
        env.controllers.clone(),
        env.dependencies.clone(),
    ))
}

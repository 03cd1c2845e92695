//! Configuration types.

use aqueduct_telemetry::LogConfig;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::ConfigError;

/// Pipe used for operations that declare a controller, unless configured.
pub const DEFAULT_CONTROLLER_PIPE: &str = "swagger_controllers";

/// Complete runner configuration.
///
/// # Example
///
/// ```
/// use aqueduct_config::{AqueductConfig, PipeStep};
///
/// let config = AqueductConfig::default().with_default_pipes();
/// assert_eq!(config.runner.controller_pipe.as_deref(), Some("swagger_controllers"));
/// assert_eq!(
///     config.pipes["swagger_controllers"],
///     vec![
///         PipeStep::from("swagger_params_parser"),
///         PipeStep::from("swagger_security"),
///         PipeStep::from("_swagger_validate"),
///         PipeStep::from("_router"),
///     ]
/// );
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct AqueductConfig {
    /// Runner settings.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Named fitting definitions.
    #[serde(default)]
    pub fittings: IndexMap<String, FittingDef>,

    /// Pipe name to ordered steps.
    #[serde(default)]
    pub pipes: IndexMap<String, Vec<PipeStep>>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AqueductConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> AqueductConfigBuilder {
        AqueductConfigBuilder::default()
    }

    /// Fills in the standard controller pipe when no pipes are configured.
    ///
    /// The standard setup is the `_router` fitting (`swagger_router` over
    /// `api/controllers`, mocks in `api/mocks`), the `_swagger_validate`
    /// fitting and the `swagger_controllers` pipe running params parsing,
    /// security, validation and routing in that order. Configurations that
    /// declare any pipe are returned unchanged.
    #[must_use]
    pub fn with_default_pipes(mut self) -> Self {
        if !self.pipes.is_empty() {
            return self;
        }

        let controller_pipe = self
            .runner
            .controller_pipe
            .get_or_insert_with(|| DEFAULT_CONTROLLER_PIPE.to_string())
            .clone();

        self.fittings.entry("_router".to_string()).or_insert_with(|| {
            FittingDef::new("swagger_router")
                .option("controllers_dirs", Value::from(vec!["api/controllers"]))
                .option("mock_controllers_dirs", Value::from(vec!["api/mocks"]))
        });
        self.fittings
            .entry("_swagger_validate".to_string())
            .or_insert_with(|| FittingDef::new("swagger_validator"));

        self.pipes.insert(
            controller_pipe,
            vec![
                PipeStep::from("swagger_params_parser"),
                PipeStep::from("swagger_security"),
                PipeStep::from("_swagger_validate"),
                PipeStep::from("_router"),
            ],
        );
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - a fitting definition has an empty type name
    /// - a pipe step names nothing
    /// - the log level is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, def) in &self.fittings {
            if def.name.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("fittings.{name}.name"),
                    "fitting type name is empty",
                ));
            }
        }

        for (pipe, steps) in &self.pipes {
            for (i, step) in steps.iter().enumerate() {
                if step.target().trim().is_empty() {
                    return Err(ConfigError::invalid_value(
                        format!("pipes.{pipe}[{i}]"),
                        "step name is empty",
                    ));
                }
            }
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("logging.level", "must not be empty"));
        }

        Ok(())
    }
}

/// Runner settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Root that controller directories are relative to.
    #[serde(default = "default_app_root")]
    pub app_root: PathBuf,

    /// Serve mock responses from mock controllers and response schemas.
    #[serde(default)]
    pub mock_mode: bool,

    /// Pipe used when nothing more specific applies.
    #[serde(default)]
    pub default_pipe: Option<String>,

    /// Pipe used for operations that declare a controller.
    #[serde(default)]
    pub controller_pipe: Option<String>,

    /// Treat duplicate operation ids as a startup error.
    #[serde(default)]
    pub enforce_unique_operation_id: bool,

    /// Start even if the specification has errors.
    #[serde(default)]
    pub start_with_errors: bool,

    /// Start even if the specification has warnings.
    #[serde(default = "default_true")]
    pub start_with_warnings: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            app_root: default_app_root(),
            mock_mode: false,
            default_pipe: None,
            controller_pipe: None,
            enforce_unique_operation_id: false,
            start_with_errors: false,
            start_with_warnings: true,
        }
    }
}

fn default_app_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

/// A named fitting definition: the fitting type plus its options.
///
/// In TOML:
///
/// ```toml
/// [fittings._router]
/// name = "swagger_router"
/// controllers_dirs = ["api/controllers"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FittingDef {
    /// The fitting type.
    pub name: String,

    /// Remaining keys, handed to the fitting factory.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl FittingDef {
    /// Creates a definition with no options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Map::new(),
        }
    }

    /// Adds an option (builder style).
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// One step of a pipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PipeStep {
    /// A fitting definition, another pipe, or a fitting type.
    Fitting(String),
    /// Designates the pipe's error-recovery fitting.
    OnError {
        /// The recovery fitting.
        on_error: String,
    },
}

impl PipeStep {
    /// Creates an `on_error` step.
    pub fn on_error(name: impl Into<String>) -> Self {
        Self::OnError {
            on_error: name.into(),
        }
    }

    /// Returns the name this step refers to.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Fitting(name) | Self::OnError { on_error: name } => name,
        }
    }
}

impl From<&str> for PipeStep {
    fn from(name: &str) -> Self {
        Self::Fitting(name.to_string())
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs.
    #[default]
    Json,
    /// Human-readable format.
    Pretty,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (trace, debug, info, warn, error, or per-target).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LoggingConfig {
    /// Converts to the telemetry crate's logging configuration.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            json_format: self.format == LogFormat::Json,
            file_line_info: self.format == LogFormat::Pretty,
            ..LogConfig::default()
        }
    }
}

/// Builder for [`AqueductConfig`].
#[derive(Debug, Default)]
pub struct AqueductConfigBuilder {
    config: AqueductConfig,
}

impl AqueductConfigBuilder {
    /// Sets the application root.
    #[must_use]
    pub fn app_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.runner.app_root = root.into();
        self
    }

    /// Enables or disables mock mode.
    #[must_use]
    pub fn mock_mode(mut self, enabled: bool) -> Self {
        self.config.runner.mock_mode = enabled;
        self
    }

    /// Sets the default pipe.
    #[must_use]
    pub fn default_pipe(mut self, pipe: impl Into<String>) -> Self {
        self.config.runner.default_pipe = Some(pipe.into());
        self
    }

    /// Sets the controller pipe.
    #[must_use]
    pub fn controller_pipe(mut self, pipe: impl Into<String>) -> Self {
        self.config.runner.controller_pipe = Some(pipe.into());
        self
    }

    /// Sets whether warnings allow startup.
    #[must_use]
    pub fn start_with_warnings(mut self, allowed: bool) -> Self {
        self.config.runner.start_with_warnings = allowed;
        self
    }

    /// Sets whether errors allow startup.
    #[must_use]
    pub fn start_with_errors(mut self, allowed: bool) -> Self {
        self.config.runner.start_with_errors = allowed;
        self
    }

    /// Sets whether duplicate operation ids are startup errors.
    #[must_use]
    pub fn enforce_unique_operation_id(mut self, enforce: bool) -> Self {
        self.config.runner.enforce_unique_operation_id = enforce;
        self
    }

    /// Adds a fitting definition.
    #[must_use]
    pub fn fitting(mut self, name: impl Into<String>, def: FittingDef) -> Self {
        self.config.fittings.insert(name.into(), def);
        self
    }

    /// Adds a pipe.
    #[must_use]
    pub fn pipe<I, S>(mut self, name: impl Into<String>, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PipeStep>,
    {
        self.config
            .pipes
            .insert(name.into(), steps.into_iter().map(Into::into).collect());
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> AqueductConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_runner_defaults() {
        let config = AqueductConfig::default();
        assert_eq!(config.runner.app_root, PathBuf::from("."));
        assert!(!config.runner.mock_mode);
        assert!(config.runner.start_with_warnings);
        assert!(!config.runner.start_with_errors);
        assert!(config.pipes.is_empty());
    }

    #[test]
    fn test_default_pipes_fill_router() {
        let config = AqueductConfig::default().with_default_pipes();
        let router = &config.fittings["_router"];
        assert_eq!(router.name, "swagger_router");
        assert_eq!(router.options["controllers_dirs"], json!(["api/controllers"]));
        assert_eq!(router.options["mock_controllers_dirs"], json!(["api/mocks"]));
        assert_eq!(config.fittings["_swagger_validate"].name, "swagger_validator");
    }

    #[test]
    fn test_default_pipes_respect_controller_pipe_name() {
        let config = AqueductConfig::builder()
            .controller_pipe("controllers")
            .build()
            .with_default_pipes();
        assert!(config.pipes.contains_key("controllers"));
        assert!(!config.pipes.contains_key(DEFAULT_CONTROLLER_PIPE));
    }

    #[test]
    fn test_default_pipes_leave_configured_pipes_alone() {
        let config = AqueductConfig::builder()
            .pipe("main", ["my_fitting"])
            .build()
            .with_default_pipes();
        assert_eq!(config.pipes.len(), 1);
        assert!(config.fittings.is_empty());
        assert!(config.runner.controller_pipe.is_none());
    }

    #[test]
    fn test_pipe_step_deserialize() {
        let steps: Vec<PipeStep> =
            serde_json::from_value(json!(["a", {"on_error": "handler"}])).unwrap();
        assert_eq!(steps[0], PipeStep::from("a"));
        assert_eq!(steps[1], PipeStep::on_error("handler"));
        assert_eq!(steps[1].target(), "handler");
    }

    #[test]
    fn test_fitting_def_flattens_options() {
        let def: FittingDef = serde_json::from_value(json!({
            "name": "swagger_router",
            "mock_mode": true,
            "controllers_dirs": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(def.name, "swagger_router");
        assert_eq!(def.options.len(), 2);
        assert_eq!(def.options["mock_mode"], json!(true));
    }

    #[test]
    fn test_validate_empty_step() {
        let config = AqueductConfig::builder().pipe("main", [""]).build();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pipes.main[0]"));
    }

    #[test]
    fn test_unknown_top_level_field_rejected() {
        let result: Result<AqueductConfig, _> = serde_json::from_value(json!({"bogus": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_logging_conversion() {
        let logging = LoggingConfig {
            format: LogFormat::Pretty,
            ..LoggingConfig::default()
        };
        let log_config = logging.to_log_config();
        assert!(!log_config.json_format);
        assert_eq!(log_config.level, "info");
    }
}

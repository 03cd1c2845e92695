//! Layered configuration loading.

use std::fs;
use std::path::Path;

use crate::{AqueductConfig, ConfigError};

/// Configuration loader.
///
/// Layers apply in order, later layers replacing earlier ones:
/// 1. Default values
/// 2. Configuration file (TOML or JSON, by extension)
/// 3. Inline configuration strings
///
/// # Example
///
/// ```no_run
/// use aqueduct_config::ConfigLoader;
///
/// # fn main() -> Result<(), aqueduct_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("config/default.toml")?
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: AqueductConfig,
}

impl ConfigLoader {
    /// Creates a loader holding the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets to the default configuration.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = AqueductConfig::default();
        self
    }

    /// Loads a `.toml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing or unreadable, has an
    /// unsupported extension, or does not parse.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| {
                ConfigError::validation_error(format!(
                    "unsupported configuration file format: {}",
                    path.display()
                ))
            })?;

        self.config = Self::parse(&content, &format)?;
        Ok(self)
    }

    /// Loads a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration from a string in `toml` or `json` format.
    ///
    /// # Example
    ///
    /// ```
    /// use aqueduct_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [runner]
    ///     mock_mode = true
    ///
    ///     [pipes]
    ///     main = ["swagger_params_parser", { on_error = "json_error" }]
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert!(config.runner.mock_mode);
    /// assert_eq!(config.pipes["main"].len(), 2);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is unknown.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = Self::parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn load(self) -> Result<AqueductConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    fn parse(content: &str, format: &str) -> Result<AqueductConfig, ConfigError> {
        match format {
            "toml" => Ok(toml::from_str(content)?),
            "json" => Ok(serde_json::from_str(content)?),
            other => Err(ConfigError::validation_error(format!(
                "unsupported configuration format: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogFormat, PipeStep};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_load() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, AqueductConfig::default());
    }

    #[test]
    fn test_toml_file() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
[runner]
app_root = "/srv/app"
controller_pipe = "controllers"

[fittings._router]
name = "swagger_router"
controllers_dirs = ["api/controllers", "lib/controllers"]

[pipes]
controllers = ["swagger_params_parser", "_router", {{ on_error = "json_error" }}]

[logging]
level = "debug"
format = "pretty"
"#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.runner.app_root.to_str(), Some("/srv/app"));
        assert_eq!(config.fittings["_router"].options["controllers_dirs"][1], "lib/controllers");
        assert_eq!(config.pipes["controllers"][2], PipeStep::on_error("json_error"));
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_json_file() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        write!(file, r#"{{"runner": {{"mock_mode": true}}}}"#).unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert!(config.runner.mock_mode);
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::new().with_file("/nonexistent/aqueduct.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_optional_missing_file() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/aqueduct.toml")
            .unwrap()
            .load()
            .unwrap();
        assert!(config.pipes.is_empty());
    }

    #[test]
    fn test_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_unknown_runner_field() {
        let result = ConfigLoader::new().with_string("[runner]\nturbo = true", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }
}

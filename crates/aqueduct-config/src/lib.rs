//! Typed configuration for Aqueduct.
//!
//! The configuration describes the runner (mock mode, pipe names, startup
//! policy), the fitting definitions, the pipes built from them, and logging.
//!
//! # Configuration File Format
//!
//! ```toml
//! [runner]
//! app_root = "."
//! mock_mode = false
//! controller_pipe = "swagger_controllers"
//! start_with_warnings = true
//!
//! [fittings._router]
//! name = "swagger_router"
//! controllers_dirs = ["api/controllers"]
//! mock_controllers_dirs = ["api/mocks"]
//!
//! [fittings._swagger_validate]
//! name = "swagger_validator"
//!
//! [pipes]
//! swagger_controllers = [
//!     "swagger_params_parser",
//!     "swagger_security",
//!     "_swagger_validate",
//!     "_router",
//! ]
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

#![doc(html_root_url = "https://docs.rs/aqueduct-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::{
    AqueductConfig, AqueductConfigBuilder, FittingDef, LogFormat, LoggingConfig, PipeStep,
    RunnerConfig, DEFAULT_CONTROLLER_PIPE,
};
pub use error::ConfigError;
pub use loader::ConfigLoader;

//! Runner startup errors.

use aqueduct_config::ConfigError;
use aqueduct_core::SetupError;
use thiserror::Error;

/// Errors that prevent a runner from starting.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Pipes could not be built or the document failed validation.
    #[error(transparent)]
    Setup(#[from] SetupError),
}

/// Result type for runner startup.
pub type RunnerResult<T> = Result<T, RunnerError>;

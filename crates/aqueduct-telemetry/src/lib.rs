//! Logging and metrics for Aqueduct.
//!
//! - **Logging**: [`logging::init_logging`] installs a `tracing-subscriber`
//!   registry with an `EnvFilter` and a JSON or pretty formatter.
//! - **Metrics**: [`metrics`] records pipe counters through the `metrics`
//!   facade. No exporter is installed here; applications install the
//!   recorder of their choice.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `aqueduct_pipe_executions_total` | Counter | `pipe`, `outcome` | Pipe runs by outcome |
//! | `aqueduct_fitting_errors_total` | Counter | `pipe`, `fitting`, `category` | Fittings that raised an error |
//! | `aqueduct_security_decisions_total` | Counter | `allowed` | Security evaluations |
//! | `aqueduct_controller_loads_total` | Counter | `controller`, `outcome` | Controller cache misses |
//! | `aqueduct_response_validation_findings_total` | Counter | `operation`, `kind` | Response validation errors and warnings |

#![doc(html_root_url = "https://docs.rs/aqueduct-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

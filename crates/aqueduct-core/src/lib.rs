//! # Aqueduct Core
//!
//! Core types for the Aqueduct pipe runner.
//!
//! - [`ApiSpec`] / [`Operation`] - the API specification document model
//! - [`Schema`] - value validation and mock sample generation
//! - [`PipeRequest`] / [`PipeResponse`] - the in-flight request and response
//! - [`PipeError`] / [`SetupError`] - per-request and startup errors
//! - [`Container`] - dependencies handed to controller factories

#![doc(html_root_url = "https://docs.rs/aqueduct-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod di;
mod error;
pub mod fixtures;
mod parameter;
mod request;
mod response;
mod schema;
pub mod spec;
mod validation;

pub use di::{Container, InjectionError};
pub use error::{ErrorCategory, ErrorDetail, ErrorEnvelope, PipeError, PipeResult, SetupError};
pub use parameter::{Parameter, ParameterLocation, ParameterType};
pub use request::{parse_urlencoded, OperationMeta, PipeRequest};
pub use response::{BufferedWriter, PipeResponse, ResponseHead, ResponseWriter};
pub use schema::{Schema, SchemaKind};
pub use spec::{ApiSpec, InterfaceStyle, Operation, PathItem, SecurityRequirement, SecurityScheme};
pub use validation::{ValidationError, ValidationResults};

//! # Aqueduct Middleware
//!
//! Pipes, fittings and the system fittings of the Aqueduct pipe runner.
//!
//! A request bound to an API operation is served by a named [`Pipe`]: an
//! ordered chain of [`Fitting`]s sharing one [`ExchangeContext`].
//!
//! ```text
//! swagger_params_parser → swagger_security → swagger_validator → swagger_router
//!          │                      │                  │                  │
//!     parse what the        OR of AND sets     declared params     controller
//!     operation needs       of scheme checks   vs. the request     handler / mock
//! ```
//!
//! | Module | Purpose |
//! |---|---|
//! | [`context`] | The per-request exchange context |
//! | [`fitting`] | The fitting trait and closure fittings |
//! | [`pipeline`] | Pipes and error recovery |
//! | [`selector`] | Choosing the pipe for an operation |
//! | [`registry`] | Fitting types and pipe construction |
//! | [`parsers`] | Request body parsers |
//! | [`controller`] | Controllers, loaders and resolution |
//! | [`fittings`] | The system fittings |
//!
//! ## Example
//!
//! ```
//! use aqueduct_config::AqueductConfig;
//! use aqueduct_core::fixtures::petstore_spec;
//! use aqueduct_middleware::{FittingEnv, FittingRegistry};
//! use std::sync::Arc;
//!
//! let config = AqueductConfig::default().with_default_pipes();
//! let env = FittingEnv::new(Arc::new(petstore_spec()));
//! let pipes = FittingRegistry::with_system_fittings()
//!     .build_pipes(&config, &env)
//!     .unwrap();
//! assert!(pipes.contains_key("swagger_controllers"));
//! ```

#![doc(html_root_url = "https://docs.rs/aqueduct-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod controller;
pub mod fitting;
pub mod fittings;
pub mod parsers;
pub mod pipeline;
pub mod registry;
pub mod selector;

pub use context::{ExchangeContext, ExchangeParts};
pub use controller::{
    Controller, ControllerError, ControllerLoader, ControllerModule, ControllerRegistry,
    OperationHandler,
};
pub use fitting::{BoxFuture, Fitting, FittingResult, FnFitting, SharedFitting};
pub use fittings::{SecurityHandler, SecurityHandlers};
pub use parsers::{BodyParser, BodyParsers, TypeMatcher};
pub use pipeline::{Pipe, PipeBuilder};
pub use registry::{FittingEnv, FittingFactory, FittingRegistry};
pub use selector::PipeSelector;

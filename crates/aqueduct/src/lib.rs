//! # Aqueduct
//!
//! **Runs HTTP requests through pipes declared against an OpenAPI document.**
//!
//! Aqueduct binds each request to the operation it targets, picks the pipe
//! that serves it, and runs that pipe's fittings in order:
//!
//! - **Binding**: path templates, path parameters, `405` with `Allow` for
//!   undeclared methods
//! - **Pipes**: ordered fittings with an optional recovery fitting
//! - **System fittings**: params parsing, security, request validation,
//!   controller routing with mock mode
//! - **Finalizing**: status, headers and content negotiation for the pipe's
//!   output
//! - **Response validation**: findings broadcast to subscribers, never sent
//!   to the client
//!
//! ## Quick Start
//!
//! ```
//! use aqueduct::middleware::{Controller, ControllerRegistry, OperationHandler};
//! use aqueduct::config::AqueductConfig;
//! use aqueduct::core::fixtures::petstore_spec;
//! use aqueduct::Runner;
//! use bytes::Bytes;
//! use serde_json::json;
//!
//! let pets = Controller::new().with(
//!     "listPets",
//!     OperationHandler::request_response(|_req, res| {
//!         Box::pin(async move {
//!             res.set_content_type("application/json")?;
//!             Ok(Some(json!([])))
//!         })
//!     }),
//! );
//!
//! let runner = Runner::builder(petstore_spec(), AqueductConfig::default())
//!     .controllers(ControllerRegistry::new().with("api/controllers/pets", pets))
//!     .build()
//!     .unwrap();
//!
//! let request = http::Request::get("/pets").body(Bytes::new()).unwrap();
//! let response = tokio_test::block_on(runner.handle(request));
//! assert_eq!(response.status(), http::StatusCode::OK);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → Binder → PipeSelector → Pipe (fittings, on_error) → Finalizer → Response
//!                                                                  ↓
//!                                        ValidatingWriter → ResponseValidationEvent
//! ```

#![doc(html_root_url = "https://docs.rs/aqueduct/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod binder;
pub mod error;
pub mod events;
pub mod finalize;
mod hook;
pub mod runner;

pub use error::{RunnerError, RunnerResult};
pub use events::ResponseValidationEvent;
pub use runner::{Dispatch, Failure, Runner, RunnerBuilder};

// Re-export core types
pub use aqueduct_core as core;

// Re-export configuration types
pub use aqueduct_config as config;

// Re-export pipes and fittings
pub use aqueduct_middleware as middleware;

// Re-export telemetry
pub use aqueduct_telemetry as telemetry;

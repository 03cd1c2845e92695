//! The fitting trait.
//!
//! A fitting is one stage of a pipe. It receives the exchange context,
//! may mutate it, and either produces an optional output value or fails
//! with a [`PipeError`].

use crate::context::ExchangeContext;
use aqueduct_core::PipeError;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of running a fitting.
///
/// `Ok(Some(value))` replaces the context output, `Ok(None)` leaves it
/// untouched.
pub type FittingResult = Result<Option<Value>, PipeError>;

/// A shared, type-erased fitting.
pub type SharedFitting = Arc<dyn Fitting>;

/// One stage of a pipe.
///
/// # Example
///
/// ```
/// use aqueduct_middleware::{BoxFuture, ExchangeContext, Fitting, FittingResult};
/// use serde_json::json;
///
/// struct Greeting;
///
/// impl Fitting for Greeting {
///     fn name(&self) -> &str {
///         "greeting"
///     }
///
///     fn run<'a>(&'a self, _ctx: &'a mut ExchangeContext) -> BoxFuture<'a, FittingResult> {
///         Box::pin(async move { Ok(Some(json!("hello"))) })
///     }
/// }
/// ```
pub trait Fitting: Send + Sync + 'static {
    /// Returns the name used in logs and metrics.
    fn name(&self) -> &str;

    /// Runs the fitting against the context.
    fn run<'a>(&'a self, ctx: &'a mut ExchangeContext) -> BoxFuture<'a, FittingResult>;
}

/// A fitting built from a closure.
///
/// ```
/// use aqueduct_middleware::FnFitting;
/// use serde_json::json;
///
/// let fitting = FnFitting::new("constant", |_ctx| Box::pin(async move { Ok(Some(json!(1))) }));
/// ```
pub struct FnFitting<F> {
    name: String,
    func: F,
}

impl<F> FnFitting<F>
where
    F: for<'a> Fn(&'a mut ExchangeContext) -> BoxFuture<'a, FittingResult> + Send + Sync + 'static,
{
    /// Creates a fitting from a function.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }

    /// Creates a shared fitting from a function.
    pub fn shared(name: impl Into<String>, func: F) -> SharedFitting {
        Arc::new(Self::new(name, func))
    }
}

impl<F> Fitting for FnFitting<F>
where
    F: for<'a> Fn(&'a mut ExchangeContext) -> BoxFuture<'a, FittingResult> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run<'a>(&'a self, ctx: &'a mut ExchangeContext) -> BoxFuture<'a, FittingResult> {
        (self.func)(ctx)
    }
}

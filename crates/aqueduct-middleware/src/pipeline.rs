//! Pipes: ordered chains of fittings.
//!
//! A [`Pipe`] runs its fittings strictly in order against one
//! [`ExchangeContext`]. The first failure stops the chain and hands control
//! to the recovery fitting, which is the pipe's own `on_error` fitting or,
//! failing that, the context's fallback error handler.
//!
//! ```text
//! fitting 1 → fitting 2 → ... → fitting N → done
//!                 │ error
//!                 ▼
//!            recovery ── Ok ──→ done (error cleared)
//!                 │
//!                 └──── Err ──→ error surfaced to the caller
//! ```

use crate::context::ExchangeContext;
use crate::fitting::SharedFitting;
use aqueduct_core::PipeError;
use aqueduct_telemetry::metrics::{self, PipeOutcome};
use tracing::{debug, warn};

/// A named, immutable chain of fittings.
///
/// # Example
///
/// ```
/// use aqueduct_core::PipeRequest;
/// use aqueduct_middleware::{ExchangeContext, FnFitting, Pipe};
/// use http::{Method, Uri};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let pipe = Pipe::builder("hello")
///     .fitting(FnFitting::shared("greet", |_ctx| Box::pin(async { Ok(Some(json!("hi"))) })))
///     .build();
///
/// let mut ctx = ExchangeContext::new(PipeRequest::new(Method::GET, Uri::from_static("/")));
/// pipe.execute(&mut ctx).await.unwrap();
/// assert_eq!(ctx.output(), Some(&json!("hi")));
/// # });
/// ```
pub struct Pipe {
    name: String,
    fittings: Vec<SharedFitting>,
    on_error: Option<SharedFitting>,
}

impl std::fmt::Debug for Pipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipe")
            .field("name", &self.name)
            .field("fittings", &self.fitting_names())
            .field("on_error", &self.on_error.as_ref().map(|f| f.name()))
            .finish()
    }
}

impl Pipe {
    /// Creates a pipe builder.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> PipeBuilder {
        PipeBuilder::new(name)
    }

    /// Returns the pipe name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fitting names in execution order.
    #[must_use]
    pub fn fitting_names(&self) -> Vec<&str> {
        self.fittings.iter().map(|f| f.name()).collect()
    }

    /// Returns the number of fittings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fittings.len()
    }

    /// Returns true if the pipe has no fittings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fittings.is_empty()
    }

    /// Returns the pipe's own recovery fitting.
    #[must_use]
    pub fn on_error(&self) -> Option<&SharedFitting> {
        self.on_error.as_ref()
    }

    /// Runs every fitting in order.
    ///
    /// Each fitting's output value, when it produces one, replaces the
    /// context output. On the first failure no further fitting runs; the
    /// error is parked in the context and the recovery fitting decides the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns the failing fitting's error unchanged when there is no
    /// recovery fitting, or the recovery fitting's own error when it
    /// re-raises.
    pub async fn execute(&self, ctx: &mut ExchangeContext) -> Result<(), PipeError> {
        for fitting in &self.fittings {
            debug!(pipe = %self.name, fitting = fitting.name(), "running fitting");
            match fitting.run(ctx).await {
                Ok(Some(value)) => ctx.set_output(value),
                Ok(None) => {}
                Err(err) => {
                    debug!(
                        pipe = %self.name,
                        fitting = fitting.name(),
                        error = %err,
                        "fitting failed"
                    );
                    metrics::record_fitting_error(&self.name, fitting.name(), err.category().as_str());
                    return self.recover(ctx, err).await;
                }
            }
        }

        metrics::record_pipe_execution(&self.name, PipeOutcome::Completed);
        Ok(())
    }

    async fn recover(&self, ctx: &mut ExchangeContext, err: PipeError) -> Result<(), PipeError> {
        let handler = self
            .on_error
            .clone()
            .or_else(|| ctx.error_handler().cloned());

        let Some(handler) = handler else {
            metrics::record_pipe_execution(&self.name, PipeOutcome::Failed);
            return Err(err);
        };

        ctx.set_error(err);
        let result = handler.run(ctx).await;
        let pending = ctx.take_error();

        match result {
            Ok(value) => {
                if let Some(value) = value {
                    ctx.set_output(value);
                }
                debug!(pipe = %self.name, handler = handler.name(), "error recovered");
                metrics::record_pipe_execution(&self.name, PipeOutcome::Recovered);
                Ok(())
            }
            Err(escalated) => {
                if pending.is_some() {
                    warn!(
                        pipe = %self.name,
                        handler = handler.name(),
                        "recovery fitting failed without consuming the original error"
                    );
                }
                metrics::record_pipe_execution(&self.name, PipeOutcome::Failed);
                Err(escalated)
            }
        }
    }
}

/// Builder for [`Pipe`].
pub struct PipeBuilder {
    name: String,
    fittings: Vec<SharedFitting>,
    on_error: Option<SharedFitting>,
}

impl PipeBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fittings: Vec::new(),
            on_error: None,
        }
    }

    /// Appends a fitting.
    #[must_use]
    pub fn fitting(mut self, fitting: SharedFitting) -> Self {
        self.fittings.push(fitting);
        self
    }

    /// Appends several fittings.
    #[must_use]
    pub fn fittings(mut self, fittings: impl IntoIterator<Item = SharedFitting>) -> Self {
        self.fittings.extend(fittings);
        self
    }

    /// Sets the recovery fitting, replacing any previous one.
    #[must_use]
    pub fn on_error(mut self, fitting: SharedFitting) -> Self {
        self.on_error = Some(fitting);
        self
    }

    /// Builds the pipe.
    #[must_use]
    pub fn build(self) -> Pipe {
        Pipe {
            name: self.name,
            fittings: self.fittings,
            on_error: self.on_error,
        }
    }
}

//! Pipe selection.

use crate::pipeline::Pipe;
use aqueduct_config::RunnerConfig;
use aqueduct_core::OperationMeta;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Chooses the pipe that serves a bound request.
///
/// The pipe name is taken from, in order:
///
/// 1. the operation's own pipe directive
/// 2. the path's pipe directive
/// 3. the controller pipe, when the operation or its path names a controller
/// 4. the default pipe
///
/// A name that resolves to no built pipe selects nothing.
#[derive(Debug, Default)]
pub struct PipeSelector {
    pipes: HashMap<String, Arc<Pipe>>,
    default_pipe: Option<String>,
    controller_pipe: Option<String>,
}

impl PipeSelector {
    /// Creates a selector over built pipes.
    #[must_use]
    pub fn new(
        pipes: HashMap<String, Arc<Pipe>>,
        default_pipe: Option<String>,
        controller_pipe: Option<String>,
    ) -> Self {
        Self {
            pipes,
            default_pipe,
            controller_pipe,
        }
    }

    /// Creates a selector using the runner's default and controller pipes.
    #[must_use]
    pub fn from_config(pipes: HashMap<String, Arc<Pipe>>, runner: &RunnerConfig) -> Self {
        Self::new(
            pipes,
            runner.default_pipe.clone(),
            runner.controller_pipe.clone(),
        )
    }

    /// Returns the pipe registered under `name`.
    #[must_use]
    pub fn pipe(&self, name: &str) -> Option<&Arc<Pipe>> {
        self.pipes.get(name)
    }

    /// Returns the number of pipes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    /// Returns true if there are no pipes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    /// Returns the pipe name the request asks for, whether or not such a
    /// pipe exists.
    #[must_use]
    pub fn pipe_name<'a>(&'a self, meta: &'a OperationMeta) -> Option<&'a str> {
        let operation = meta.operation.as_deref();

        let path_pipe = meta
            .path
            .as_deref()
            .and_then(|path| path.pipe())
            .or_else(|| operation.and_then(|op| op.path_directives().pipe.as_deref()));

        let has_controller = operation.and_then(|op| op.controller()).is_some()
            || meta
                .path
                .as_deref()
                .and_then(|path| path.directives().controller.as_deref())
                .is_some();

        operation
            .and_then(|op| op.pipe())
            .or(path_pipe)
            .or_else(|| {
                if has_controller {
                    self.controller_pipe.as_deref()
                } else {
                    None
                }
            })
            .or(self.default_pipe.as_deref())
    }

    /// Selects the pipe for a bound request.
    ///
    /// Returns `None` when no name resolves or the name has no pipe.
    #[must_use]
    pub fn select(&self, meta: &OperationMeta) -> Option<Arc<Pipe>> {
        let Some(name) = self.pipe_name(meta) else {
            debug!("no pipe requested and no default pipe");
            return None;
        };

        match self.pipes.get(name) {
            Some(pipe) => {
                debug!(pipe = name, "pipe selected");
                Some(pipe.clone())
            }
            None => {
                debug!(pipe = name, "pipe is not defined");
                None
            }
        }
    }
}

//! Binding requests to declared operations.

use aqueduct_core::{ApiSpec, PipeError, PipeRequest};
use http::header::{HeaderValue, ALLOW};
use http::Method;
use tracing::debug;

/// Outcome of binding a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// The path is declared; the request carries its metadata.
    Bound,
    /// No declared path matches.
    Unmatched,
}

/// Attaches the matched path, operation and path parameters to a request.
///
/// A declared path without an operation for the request method is only
/// bound when the path has its own pipe or the method is `OPTIONS`.
///
/// # Errors
///
/// Returns a routing error (405) carrying the path's methods, sorted, in an
/// `Allow` header when the path is declared but the method is not.
pub fn bind(spec: &ApiSpec, req: &mut PipeRequest) -> Result<Binding, PipeError> {
    let Some((path, params)) = spec.match_path(req.path()) else {
        debug!(path = req.path(), "no declared path");
        return Ok(Binding::Unmatched);
    };
    let path = path.clone();
    let operation = path.operation(req.method()).cloned();

    if operation.is_none() && path.pipe().is_none() && req.method() != Method::OPTIONS {
        let allowed = path.allowed_methods();
        let message = format!(
            "Path [{}] defined in Swagger, but {} operation is not.",
            path.template(),
            req.method()
        );
        debug!(path = path.template(), method = %req.method(), allowed = ?allowed, "method not declared");

        let mut err = PipeError::routing(message);
        if let Ok(value) = HeaderValue::from_str(&allowed.join(", ")) {
            err = err.with_header(ALLOW, value);
        }
        return Err(err.with_allowed_methods(allowed));
    }

    req.set_path_params(params);
    let meta = req.meta_mut();
    meta.path = Some(path);
    meta.operation = operation;
    Ok(Binding::Bound)
}

//! The `swagger_validator` fitting.

use crate::context::ExchangeContext;
use crate::fitting::{BoxFuture, Fitting, FittingResult};
use aqueduct_core::PipeError;
use tracing::debug;

/// Fitting type name.
pub const VALIDATOR: &str = "swagger_validator";

/// Validates the request against the bound operation's parameters.
///
/// Any error fails the request with status 400, message
/// `Validation errors`, and the individual findings attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatorFitting;

impl Fitting for ValidatorFitting {
    fn name(&self) -> &str {
        VALIDATOR
    }

    fn run<'a>(&'a self, ctx: &'a mut ExchangeContext) -> BoxFuture<'a, FittingResult> {
        Box::pin(async move {
            let Some(operation) = ctx.request().operation() else {
                debug!("no operation bound, request not validated");
                return Ok(None);
            };

            let results = operation.validate_request(ctx.request());
            if results.has_errors() {
                debug!(
                    operation_id = operation.operation_id().unwrap_or_default(),
                    errors = results.errors.len(),
                    "request validation failed"
                );
                return Err(PipeError::validation_with_errors(
                    "Validation errors",
                    results.errors,
                ));
            }
            Ok(None)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqueduct_core::fixtures::petstore_spec;
    use aqueduct_core::PipeRequest;
    use http::{Method, StatusCode, Uri};

    fn context(method: Method, uri: &'static str, operation_id: &str) -> ExchangeContext {
        let spec = petstore_spec();
        let mut req = PipeRequest::new(method, Uri::from_static(uri));
        req.meta_mut().operation = spec.operation_by_id(operation_id).cloned();
        ExchangeContext::new(req)
    }

    #[tokio::test]
    async fn test_valid_request_passes() {
        let mut ctx = context(Method::GET, "/pets?limit=10", "listPets");
        assert!(ValidatorFitting.run(&mut ctx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_request_fails_with_entries() {
        let mut ctx = context(Method::GET, "/pets?limit=1000", "listPets");
        let err = ValidatorFitting.run(&mut ctx).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Validation errors");
        assert_eq!(err.validation_errors().len(), 1);
        assert_eq!(err.validation_errors()[0].code, "MAXIMUM");
    }

    #[tokio::test]
    async fn test_missing_required_body() {
        let mut ctx = context(Method::POST, "/pets", "createPet");
        let err = ValidatorFitting.run(&mut ctx).await.unwrap_err();
        assert_eq!(err.validation_errors()[0].code, "REQUIRED");
    }

    #[tokio::test]
    async fn test_without_operation() {
        let mut ctx = ExchangeContext::new(PipeRequest::new(Method::GET, Uri::from_static("/")));
        assert!(ValidatorFitting.run(&mut ctx).await.unwrap().is_none());
    }
}

//! End-to-end tests of the default controller pipe.
//!
//! The pipe is built from the default configuration and runs the four
//! system fittings in order:
//!
//! 1. Params parser - query and body parsing, parameter extraction
//! 2. Security - API key checks
//! 3. Validator - declared parameters against the request
//! 4. Router - controller dispatch or mocks

use aqueduct_config::AqueductConfig;
use aqueduct_core::fixtures::petstore_spec;
use aqueduct_core::{ApiSpec, ErrorCategory, PipeError, PipeRequest};
use aqueduct_middleware::fittings::ScopeOrKey;
use aqueduct_middleware::{
    Controller, ControllerRegistry, ExchangeContext, FittingEnv, FittingRegistry, OperationHandler,
    Pipe, SecurityHandler, SecurityHandlers,
};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{Method, StatusCode, Uri};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const API_KEY: &str = "s3cret";

fn api_key_handler() -> SecurityHandler {
    SecurityHandler::scheme(|_req, _scheme, key| {
        Box::pin(async move {
            match key {
                Some(ScopeOrKey::Key(key)) if key == API_KEY => Ok(()),
                _ => Err(PipeError::authorization("invalid api key")),
            }
        })
    })
}

fn pets_controller(created: Arc<AtomicUsize>) -> Controller {
    Controller::new()
        .with(
            "listPets",
            OperationHandler::request_response(|req, res| {
                Box::pin(async move {
                    let limit = req.meta().params.get("limit").cloned().unwrap_or(Value::Null);
                    res.set_content_type("application/json")?;
                    Ok(Some(json!({"limit": limit, "pets": []})))
                })
            }),
        )
        .with(
            "createPet",
            OperationHandler::request_response(move |req, res| {
                let created = created.clone();
                Box::pin(async move {
                    created.fetch_add(1, Ordering::SeqCst);
                    res.set_status(StatusCode::CREATED);
                    Ok(req.meta().params.get("pet").cloned())
                })
            }),
        )
}

struct Harness {
    spec: Arc<ApiSpec>,
    pipe: Arc<Pipe>,
    created: Arc<AtomicUsize>,
}

fn harness(mock_mode: bool) -> Harness {
    let spec = Arc::new(petstore_spec());
    let created = Arc::new(AtomicUsize::new(0));

    let mut env = FittingEnv::new(spec.clone());
    env.mock_mode = mock_mode;
    env.security_handlers = Arc::new(
        SecurityHandlers::new()
            .with("api_key", api_key_handler())
            .with("query_key", api_key_handler()),
    );
    env.controllers = Arc::new(
        ControllerRegistry::new().with("api/controllers/pets", pets_controller(created.clone())),
    );

    let config = AqueductConfig::default().with_default_pipes();
    let pipes = FittingRegistry::with_system_fittings()
        .build_pipes(&config, &env)
        .unwrap();

    Harness {
        spec,
        pipe: pipes["swagger_controllers"].clone(),
        created,
    }
}

impl Harness {
    fn context(&self, req: PipeRequest) -> ExchangeContext {
        let mut req = req;
        let (path, params) = self.spec.match_path(req.path()).unwrap();
        let (path, operation) = (path.clone(), path.operation(req.method()).cloned());
        req.set_path_params(params);
        req.meta_mut().path = Some(path);
        req.meta_mut().operation = operation;
        ExchangeContext::new(req)
    }

    async fn run(&self, req: PipeRequest) -> (ExchangeContext, Result<(), PipeError>) {
        let mut ctx = self.context(req);
        let result = self.pipe.execute(&mut ctx).await;
        (ctx, result)
    }
}

fn get(uri: &'static str) -> PipeRequest {
    PipeRequest::new(Method::GET, Uri::from_static(uri))
}

fn create_pet(body: &'static str, key: Option<&'static str>) -> PipeRequest {
    let req = PipeRequest::new(Method::POST, Uri::from_static("/pets"))
        .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .with_raw_body(body);
    match key {
        Some(key) => req.with_header(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_static(key),
        ),
        None => req,
    }
}

#[tokio::test]
async fn test_list_pets_reaches_controller() {
    let harness = harness(false);
    let (ctx, result) = harness.run(get("/pets?limit=5")).await;

    result.unwrap();
    assert_eq!(ctx.output(), Some(&json!({"limit": 5, "pets": []})));
    assert_eq!(ctx.response().content_type(), Some("application/json"));
}

#[tokio::test]
async fn test_create_pet_with_valid_key() {
    let harness = harness(false);
    let (ctx, result) = harness
        .run(create_pet(r#"{"name":"Rex"}"#, Some(API_KEY)))
        .await;

    result.unwrap();
    assert_eq!(ctx.output(), Some(&json!({"name": "Rex"})));
    assert_eq!(ctx.response().status(), StatusCode::CREATED);
    assert_eq!(harness.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_key_is_denied_before_controller() {
    let harness = harness(false);
    let (ctx, result) = harness.run(create_pet(r#"{"name":"Rex"}"#, None)).await;

    let err = result.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authorization);
    assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(ctx.response().status(), StatusCode::FORBIDDEN);
    assert_eq!(harness.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_body_fails_validation() {
    let harness = harness(false);
    let (_ctx, result) = harness.run(create_pet(r#"{"name":""}"#, Some(API_KEY))).await;

    let err = result.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(err.message(), "Validation errors");
    assert!(!err.validation_errors().is_empty());
    assert_eq!(harness.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_json_is_rejected_by_parser() {
    let harness = harness(false);
    let (_ctx, result) = harness.run(create_pet("{oops", Some(API_KEY))).await;

    let err = result.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Validation);
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_query_key_alternative() {
    let harness = harness(true);
    let (ctx, result) = harness.run(get("/pets/7?api_key=s3cret")).await;

    result.unwrap();
    assert_eq!(ctx.output(), Some(&json!({"id": 7, "name": "Rex"})));
}

#[tokio::test]
async fn test_mock_mode_serves_examples() {
    let harness = harness(true);
    let req = get("/pets/7").with_header(
        HeaderName::from_static("x-api-key"),
        HeaderValue::from_static(API_KEY),
    );
    let (ctx, result) = harness.run(req).await;

    result.unwrap();
    assert_eq!(ctx.output(), Some(&json!({"id": 7, "name": "Rex"})));
    assert_eq!(ctx.status_code(), Some(StatusCode::OK));
    assert_eq!(ctx.headers().get(CONTENT_TYPE).unwrap(), "application/json");
}

#[tokio::test]
async fn test_file_upload_operation_is_rejected() {
    let harness = harness(false);
    let req = PipeRequest::new(Method::POST, Uri::from_static("/pets/7/photo"))
        .with_header(CONTENT_TYPE, HeaderValue::from_static("multipart/form-data"))
        .with_raw_body("--x--");
    let (_ctx, result) = harness.run(req).await;

    let err = result.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
}

//! The API specification document model.
//!
//! An [`ApiSpec`] is a list of [`PathItem`]s, each holding the
//! [`Operation`]s declared for its methods. Documents are assembled with
//! builders; building resolves inherited settings (global security and
//! `produces`, path-level directives) onto each operation so that the
//! operation alone is enough to drive a pipe.
//!
//! # Example
//!
//! ```
//! use aqueduct_core::spec::{ApiSpec, Operation, PathItem, ResponseSpec};
//! use aqueduct_core::Schema;
//! use http::Method;
//!
//! let spec = ApiSpec::builder("Pet Store")
//!     .produces("application/json")
//!     .path(
//!         PathItem::builder("/pets")
//!             .controller("pets")
//!             .operation(
//!                 Operation::builder(Method::GET)
//!                     .operation_id("listPets")
//!                     .response("200", ResponseSpec::new("pets").schema(Schema::array(Schema::any()))),
//!             ),
//!     )
//!     .build();
//!
//! let (path, _) = spec.match_path("/pets").unwrap();
//! let op = path.operation(&Method::GET).unwrap();
//! assert_eq!(op.operation_id(), Some("listPets"));
//! assert_eq!(op.controller(), Some("pets"));
//! assert_eq!(op.produces(), ["application/json"]);
//! ```

use crate::parameter::{Parameter, ParameterLocation};
use crate::request::PipeRequest;
use crate::schema::Schema;
use crate::validation::{ValidationError, ValidationResults};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, StatusCode};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Controller calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterfaceStyle {
    /// Handlers receive the request and the response.
    Middleware,
    /// Handlers receive the exchange context.
    Pipe,
    /// Classified once per operation from the handler's declared shape.
    AutoDetect,
}

impl FromStr for InterfaceStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "middleware" => Ok(Self::Middleware),
            "pipe" => Ok(Self::Pipe),
            "auto-detect" => Ok(Self::AutoDetect),
            other => Err(format!(
                "'{other}' is not a valid interface style (middleware, pipe, auto-detect)"
            )),
        }
    }
}

impl fmt::Display for InterfaceStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Middleware => "middleware",
            Self::Pipe => "pipe",
            Self::AutoDetect => "auto-detect",
        })
    }
}

/// Where an API key is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    /// A query string parameter.
    Query,
    /// A request header.
    Header,
}

/// A security scheme definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SecurityScheme {
    /// An API key carried in the query string or a header.
    ApiKey {
        /// The query parameter or header name.
        name: String,
        /// Where the key is carried.
        #[serde(rename = "in")]
        location: ApiKeyLocation,
    },
    /// OAuth2 with declared scopes.
    #[serde(rename = "oauth2")]
    OAuth2 {
        /// Scope name to description.
        #[serde(default)]
        scopes: IndexMap<String, String>,
    },
    /// HTTP basic authentication.
    Basic,
}

impl SecurityScheme {
    /// Creates an API key scheme.
    pub fn api_key(name: impl Into<String>, location: ApiKeyLocation) -> Self {
        Self::ApiKey {
            name: name.into(),
            location,
        }
    }

    /// Creates an OAuth2 scheme with the given scope names.
    #[must_use]
    pub fn oauth2(scopes: &[&str]) -> Self {
        Self::OAuth2 {
            scopes: scopes
                .iter()
                .map(|s| ((*s).to_string(), String::new()))
                .collect(),
        }
    }
}

/// One AND-group of security checks: scheme name to required scopes.
pub type SecurityRequirement = IndexMap<String, Vec<String>>;

/// Builds a [`SecurityRequirement`] whose schemes need no scopes.
#[must_use]
pub fn requirement(schemes: &[&str]) -> SecurityRequirement {
    schemes
        .iter()
        .map(|name| ((*name).to_string(), Vec::new()))
        .collect()
}

/// Builds a single-scheme [`SecurityRequirement`] with scopes.
#[must_use]
pub fn scoped_requirement(scheme: &str, scopes: &[&str]) -> SecurityRequirement {
    let mut set = SecurityRequirement::new();
    set.insert(
        scheme.to_string(),
        scopes.iter().map(|s| (*s).to_string()).collect(),
    );
    set
}

/// A declared response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseSpec {
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema: Option<Schema>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    examples: IndexMap<String, Value>,
}

impl ResponseSpec {
    /// Creates a response with no schema.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            schema: None,
            examples: IndexMap::new(),
        }
    }

    /// Sets the response body schema.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Declares an example body for a mime type.
    #[must_use]
    pub fn example(mut self, mime: impl Into<String>, example: Value) -> Self {
        self.examples.insert(mime.into(), example);
        self
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the body schema.
    #[must_use]
    pub fn body_schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Returns the example declared for `mime`, ignoring media type
    /// parameters.
    #[must_use]
    pub fn example_for(&self, mime: &str) -> Option<&Value> {
        let wanted = essence(mime);
        self.examples
            .iter()
            .find(|(declared, _)| essence(declared).eq_ignore_ascii_case(wanted))
            .map(|(_, example)| example)
    }
}

/// Returns the media type without parameters.
pub fn essence(mime: &str) -> &str {
    mime.split(';').next().unwrap_or(mime).trim()
}

/// Pipe, controller and interface directives declared on a path or an
/// operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directives {
    /// Explicit pipe name.
    #[serde(default)]
    pub pipe: Option<String>,
    /// Controller reference.
    #[serde(default)]
    pub controller: Option<String>,
    /// Controller calling convention.
    #[serde(default)]
    pub interface: Option<InterfaceStyle>,
}

/// A declared operation.
#[derive(Debug, Clone)]
pub struct Operation {
    operation_id: Option<String>,
    method: Method,
    path: String,
    parameters: Vec<Parameter>,
    security: Vec<SecurityRequirement>,
    responses: IndexMap<String, ResponseSpec>,
    produces: Vec<String>,
    directives: Directives,
    path_directives: Directives,
}

impl Operation {
    /// Creates an operation builder for `method`.
    #[must_use]
    pub fn builder(method: Method) -> OperationBuilder {
        OperationBuilder::new(method)
    }

    /// Returns the declared operation id.
    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.operation_id.as_deref()
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the owning path template.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns a stable key (`"GET /pets/{petId}"`) identifying the
    /// operation within its document.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Returns the parameter descriptors in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Returns the security requirement sets (OR of AND-groups). Global
    /// security has already been applied.
    #[must_use]
    pub fn security(&self) -> &[SecurityRequirement] {
        &self.security
    }

    /// Returns the declared responses keyed by status code or `default`.
    #[must_use]
    pub fn responses(&self) -> &IndexMap<String, ResponseSpec> {
        &self.responses
    }

    /// Returns the response declared for `status`, falling back to
    /// `default`.
    #[must_use]
    pub fn response_for(&self, status: u16) -> Option<&ResponseSpec> {
        self.responses
            .get(status.to_string().as_str())
            .or_else(|| self.responses.get("default"))
    }

    /// Returns the producible mime types.
    #[must_use]
    pub fn produces(&self) -> &[String] {
        &self.produces
    }

    /// Returns the operation's own pipe directive.
    #[must_use]
    pub fn pipe(&self) -> Option<&str> {
        self.directives.pipe.as_deref()
    }

    /// Returns the controller reference, looking at the operation first and
    /// its path second.
    #[must_use]
    pub fn controller(&self) -> Option<&str> {
        self.directives
            .controller
            .as_deref()
            .or(self.path_directives.controller.as_deref())
    }

    /// Returns the interface directive, looking at the operation first and
    /// its path second.
    #[must_use]
    pub fn interface(&self) -> Option<InterfaceStyle> {
        self.directives.interface.or(self.path_directives.interface)
    }

    /// Returns the directives declared on the operation itself.
    #[must_use]
    pub fn directives(&self) -> &Directives {
        &self.directives
    }

    /// Returns the directives declared on the owning path.
    #[must_use]
    pub fn path_directives(&self) -> &Directives {
        &self.path_directives
    }

    /// Validates the declared parameters against a request.
    #[must_use]
    pub fn validate_request(&self, req: &PipeRequest) -> ValidationResults {
        let mut results = ValidationResults::new();
        for param in &self.parameters {
            for err in param.validate(req) {
                results.error(err);
            }
        }
        results
    }

    /// Validates a produced response against the declared responses.
    #[must_use]
    pub fn validate_response(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> ValidationResults {
        let mut results = ValidationResults::new();

        let Some(response) = self.response_for(status.as_u16()) else {
            results.error(ValidationError::new(
                "INVALID_RESPONSE_CODE",
                "statusCode",
                format!(
                    "This operation does not have a defined '{}' or 'default' response code",
                    status.as_u16()
                ),
            ));
            return results;
        };

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(essence);

        match content_type {
            Some(ct) if !self.produces.is_empty()
                && !self.produces.iter().any(|p| essence(p).eq_ignore_ascii_case(ct)) =>
            {
                results.error(ValidationError::new(
                    "INVALID_CONTENT_TYPE",
                    "headers.content-type",
                    format!(
                        "Invalid Content-Type ({ct}). These are supported: {}",
                        self.produces.join(", ")
                    ),
                ));
            }
            None if !body.is_empty() => results.warning(ValidationError::new(
                "MISSING_CONTENT_TYPE",
                "headers.content-type",
                "Response has a body but no Content-Type",
            )),
            _ => {}
        }

        let Some(schema) = response.body_schema() else {
            return results;
        };

        let value = if content_type.is_some_and(|ct| ct.contains("json")) {
            match serde_json::from_slice::<Value>(body) {
                Ok(value) => value,
                Err(e) => {
                    results.error(ValidationError::new(
                        "INVALID_RESPONSE_BODY",
                        "body",
                        format!("Response body is not valid JSON: {e}"),
                    ));
                    return results;
                }
            }
        } else if body.is_empty() {
            Value::Null
        } else {
            Value::String(String::from_utf8_lossy(body).into_owned())
        };

        for mut err in schema.validate(&value) {
            err.path = format!("body{}", err.path.trim_start_matches('$'));
            results.error(err);
        }
        results
    }
}

/// Builder for [`Operation`]s. Path-dependent fields are filled in when the
/// owning [`PathItem`] is built.
#[derive(Debug, Clone)]
pub struct OperationBuilder {
    operation_id: Option<String>,
    method: Method,
    parameters: Vec<Parameter>,
    security: Option<Vec<SecurityRequirement>>,
    responses: IndexMap<String, ResponseSpec>,
    produces: Vec<String>,
    directives: Directives,
}

impl OperationBuilder {
    /// Creates a builder for `method`.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            operation_id: None,
            method,
            parameters: Vec::new(),
            security: None,
            responses: IndexMap::new(),
            produces: Vec::new(),
            directives: Directives::default(),
        }
    }

    /// Sets the operation id.
    #[must_use]
    pub fn operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation_id = Some(id.into());
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn parameter(mut self, param: Parameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Adds a security requirement set. Declaring any set replaces the
    /// document's global security.
    #[must_use]
    pub fn security(mut self, requirement: SecurityRequirement) -> Self {
        self.security.get_or_insert_with(Vec::new).push(requirement);
        self
    }

    /// Declares that the operation needs no security, overriding global
    /// security.
    #[must_use]
    pub fn no_security(mut self) -> Self {
        self.security = Some(Vec::new());
        self
    }

    /// Declares a response for a status code or `default`.
    #[must_use]
    pub fn response(mut self, status: impl Into<String>, response: ResponseSpec) -> Self {
        self.responses.insert(status.into(), response);
        self
    }

    /// Adds a producible mime type, replacing the document default.
    #[must_use]
    pub fn produces(mut self, mime: impl Into<String>) -> Self {
        self.produces.push(mime.into());
        self
    }

    /// Sets the operation's pipe directive.
    #[must_use]
    pub fn pipe(mut self, pipe: impl Into<String>) -> Self {
        self.directives.pipe = Some(pipe.into());
        self
    }

    /// Sets the operation's controller reference.
    #[must_use]
    pub fn controller(mut self, controller: impl Into<String>) -> Self {
        self.directives.controller = Some(controller.into());
        self
    }

    /// Sets the operation's interface directive.
    #[must_use]
    pub fn interface(mut self, style: InterfaceStyle) -> Self {
        self.directives.interface = Some(style);
        self
    }

    fn build(
        self,
        path: &str,
        path_directives: &Directives,
        global_security: &[SecurityRequirement],
        default_produces: &[String],
    ) -> Operation {
        Operation {
            operation_id: self.operation_id,
            method: self.method,
            path: path.to_string(),
            parameters: self.parameters,
            security: self
                .security
                .unwrap_or_else(|| global_security.to_vec()),
            responses: self.responses,
            produces: if self.produces.is_empty() {
                default_produces.to_vec()
            } else {
                self.produces
            },
            directives: self.directives,
            path_directives: path_directives.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Literal(String),
    Parameter(String),
}

fn parse_template(template: &str) -> Vec<PathSegment> {
    template
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            match segment
                .strip_prefix('{')
                .and_then(|s| s.strip_suffix('}'))
            {
                Some(name) => PathSegment::Parameter(name.to_string()),
                None => PathSegment::Literal(segment.to_string()),
            }
        })
        .collect()
}

/// A declared path and its operations.
#[derive(Debug, Clone)]
pub struct PathItem {
    template: String,
    segments: Vec<PathSegment>,
    directives: Directives,
    operations: Vec<Arc<Operation>>,
}

impl PathItem {
    /// Creates a path builder for a template such as `/pets/{petId}`.
    #[must_use]
    pub fn builder(template: impl Into<String>) -> PathItemBuilder {
        PathItemBuilder::new(template)
    }

    /// Returns the path template.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the path-level directives.
    #[must_use]
    pub fn directives(&self) -> &Directives {
        &self.directives
    }

    /// Returns the path-level pipe directive.
    #[must_use]
    pub fn pipe(&self) -> Option<&str> {
        self.directives.pipe.as_deref()
    }

    /// Returns the declared operations.
    #[must_use]
    pub fn operations(&self) -> &[Arc<Operation>] {
        &self.operations
    }

    /// Returns the operation declared for `method`.
    #[must_use]
    pub fn operation(&self, method: &Method) -> Option<&Arc<Operation>> {
        self.operations.iter().find(|op| op.method() == method)
    }

    /// Returns the declared methods, upper-cased and sorted ascending.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self
            .operations
            .iter()
            .map(|op| op.method().as_str().to_ascii_uppercase())
            .collect();
        methods.sort();
        methods.dedup();
        methods
    }

    /// Matches a concrete request path, returning the bound path
    /// parameters.
    #[must_use]
    pub fn match_path(&self, request_path: &str) -> Option<HashMap<String, String>> {
        let actual: Vec<&str> = request_path.split('/').filter(|s| !s.is_empty()).collect();
        if actual.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, value) in self.segments.iter().zip(actual) {
            match segment {
                PathSegment::Literal(lit) if lit == value => {}
                PathSegment::Literal(_) => return None,
                PathSegment::Parameter(name) => {
                    params.insert(name.clone(), value.to_string());
                }
            }
        }
        Some(params)
    }

    fn parameter_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, PathSegment::Parameter(_)))
            .count()
    }
}

/// Builder for [`PathItem`]s.
#[derive(Debug, Clone)]
pub struct PathItemBuilder {
    template: String,
    directives: Directives,
    operations: Vec<OperationBuilder>,
}

impl PathItemBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            directives: Directives::default(),
            operations: Vec::new(),
        }
    }

    /// Sets the path-level pipe directive.
    #[must_use]
    pub fn pipe(mut self, pipe: impl Into<String>) -> Self {
        self.directives.pipe = Some(pipe.into());
        self
    }

    /// Sets the path-level controller reference.
    #[must_use]
    pub fn controller(mut self, controller: impl Into<String>) -> Self {
        self.directives.controller = Some(controller.into());
        self
    }

    /// Sets the path-level interface directive.
    #[must_use]
    pub fn interface(mut self, style: InterfaceStyle) -> Self {
        self.directives.interface = Some(style);
        self
    }

    /// Adds an operation.
    #[must_use]
    pub fn operation(mut self, operation: OperationBuilder) -> Self {
        self.operations.push(operation);
        self
    }

    fn build(self, global_security: &[SecurityRequirement], produces: &[String]) -> PathItem {
        let operations = self
            .operations
            .into_iter()
            .map(|op| {
                Arc::new(op.build(&self.template, &self.directives, global_security, produces))
            })
            .collect();
        PathItem {
            segments: parse_template(&self.template),
            template: self.template,
            directives: self.directives,
            operations,
        }
    }
}

/// An API specification document.
#[derive(Debug, Clone)]
pub struct ApiSpec {
    title: String,
    version: String,
    produces: Vec<String>,
    interface: Option<InterfaceStyle>,
    security_definitions: IndexMap<String, SecurityScheme>,
    paths: Vec<Arc<PathItem>>,
}

impl ApiSpec {
    /// Creates a document builder.
    #[must_use]
    pub fn builder(title: impl Into<String>) -> ApiSpecBuilder {
        ApiSpecBuilder::new(title)
    }

    /// Returns the document title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the document version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the document-level producible mime types.
    #[must_use]
    pub fn produces(&self) -> &[String] {
        &self.produces
    }

    /// Returns the document-level interface directive.
    #[must_use]
    pub fn interface(&self) -> Option<InterfaceStyle> {
        self.interface
    }

    /// Returns all security scheme definitions.
    #[must_use]
    pub fn security_definitions(&self) -> &IndexMap<String, SecurityScheme> {
        &self.security_definitions
    }

    /// Returns the security scheme definition named `name`.
    #[must_use]
    pub fn security_definition(&self, name: &str) -> Option<&SecurityScheme> {
        self.security_definitions.get(name)
    }

    /// Returns the declared paths.
    #[must_use]
    pub fn paths(&self) -> &[Arc<PathItem>] {
        &self.paths
    }

    /// Iterates over every declared operation.
    pub fn operations(&self) -> impl Iterator<Item = &Arc<Operation>> {
        self.paths.iter().flat_map(|p| p.operations().iter())
    }

    /// Finds an operation by id.
    #[must_use]
    pub fn operation_by_id(&self, id: &str) -> Option<&Arc<Operation>> {
        self.operations().find(|op| op.operation_id() == Some(id))
    }

    /// Matches a concrete request path. When several templates match, the
    /// one with the fewest templated segments wins, then declaration order.
    #[must_use]
    pub fn match_path(&self, request_path: &str) -> Option<(&Arc<PathItem>, HashMap<String, String>)> {
        self.paths
            .iter()
            .filter_map(|p| p.match_path(request_path).map(|params| (p, params)))
            .min_by_key(|(p, _)| p.parameter_count())
    }

    /// Validates the document itself.
    ///
    /// Errors: `DUPLICATE_OPERATIONID`, `UNRESOLVABLE_SECURITY_DEFINITION`,
    /// `DUPLICATE_PARAMETER`, `MISSING_PATH_PARAMETER_DEFINITION`.
    /// Warnings: `MISSING_RESPONSES`.
    #[must_use]
    pub fn validate(&self) -> ValidationResults {
        let mut results = ValidationResults::new();
        let mut seen_ids = HashSet::new();

        for path in &self.paths {
            for op in path.operations() {
                let op_path = format!(
                    "paths.{}.{}",
                    path.template(),
                    op.method().as_str().to_ascii_lowercase()
                );

                if let Some(id) = op.operation_id() {
                    if !seen_ids.insert(id) {
                        results.error(ValidationError::new(
                            "DUPLICATE_OPERATIONID",
                            format!("{op_path}.operationId"),
                            format!("Cannot have multiple operations with the same operationId: {id}"),
                        ));
                    }
                }

                for (i, set) in op.security().iter().enumerate() {
                    for name in set.keys() {
                        if !self.security_definitions.contains_key(name) {
                            results.error(ValidationError::new(
                                "UNRESOLVABLE_SECURITY_DEFINITION",
                                format!("{op_path}.security[{i}].{name}"),
                                format!("Security definition could not be resolved: {name}"),
                            ));
                        }
                    }
                }

                let mut seen_params = HashSet::new();
                for param in op.parameters() {
                    if !seen_params.insert((param.location(), param.name())) {
                        results.error(ValidationError::new(
                            "DUPLICATE_PARAMETER",
                            format!("{op_path}.parameters.{}", param.name()),
                            format!("Operation cannot have duplicate parameters: {}", param.name()),
                        ));
                    }
                }

                for segment in &path.segments {
                    if let PathSegment::Parameter(name) = segment {
                        let declared = op.parameters().iter().any(|p| {
                            p.location() == ParameterLocation::Path && p.name() == name
                        });
                        if !declared {
                            results.error(ValidationError::new(
                                "MISSING_PATH_PARAMETER_DEFINITION",
                                op_path.clone(),
                                format!("Path parameter is declared but is not defined: {name}"),
                            ));
                        }
                    }
                }

                if op.responses().is_empty() {
                    results.warning(ValidationError::new(
                        "MISSING_RESPONSES",
                        format!("{op_path}.responses"),
                        "Operation declares no responses",
                    ));
                }
            }
        }

        results
    }
}

/// Builder for [`ApiSpec`] documents.
#[derive(Debug, Clone)]
pub struct ApiSpecBuilder {
    title: String,
    version: String,
    produces: Vec<String>,
    interface: Option<InterfaceStyle>,
    security_definitions: IndexMap<String, SecurityScheme>,
    security: Vec<SecurityRequirement>,
    paths: Vec<PathItemBuilder>,
}

impl ApiSpecBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: "1.0.0".to_string(),
            produces: Vec::new(),
            interface: None,
            security_definitions: IndexMap::new(),
            security: Vec::new(),
            paths: Vec::new(),
        }
    }

    /// Sets the document version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Adds a document-level producible mime type.
    #[must_use]
    pub fn produces(mut self, mime: impl Into<String>) -> Self {
        self.produces.push(mime.into());
        self
    }

    /// Sets the document-level interface directive.
    #[must_use]
    pub fn interface(mut self, style: InterfaceStyle) -> Self {
        self.interface = Some(style);
        self
    }

    /// Defines a security scheme.
    #[must_use]
    pub fn security_definition(mut self, name: impl Into<String>, scheme: SecurityScheme) -> Self {
        self.security_definitions.insert(name.into(), scheme);
        self
    }

    /// Adds a global security requirement set.
    #[must_use]
    pub fn security(mut self, requirement: SecurityRequirement) -> Self {
        self.security.push(requirement);
        self
    }

    /// Adds a path.
    #[must_use]
    pub fn path(mut self, path: PathItemBuilder) -> Self {
        self.paths.push(path);
        self
    }

    /// Builds the document.
    #[must_use]
    pub fn build(self) -> ApiSpec {
        let paths = self
            .paths
            .into_iter()
            .map(|p| Arc::new(p.build(&self.security, &self.produces)))
            .collect();
        ApiSpec {
            title: self.title,
            version: self.version,
            produces: self.produces,
            interface: self.interface,
            security_definitions: self.security_definitions,
            paths,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterType;
    use http::header::HeaderValue;
    use serde_json::json;

    fn spec() -> ApiSpec {
        ApiSpec::builder("test")
            .produces("application/json")
            .security_definition("api_key", SecurityScheme::api_key("X-API-Key", ApiKeyLocation::Header))
            .security(requirement(&["api_key"]))
            .path(
                PathItem::builder("/pets")
                    .controller("pets")
                    .operation(
                        Operation::builder(Method::POST)
                            .operation_id("createPet")
                            .response("201", ResponseSpec::new("created")),
                    )
                    .operation(
                        Operation::builder(Method::GET)
                            .operation_id("listPets")
                            .no_security()
                            .produces("text/plain")
                            .response(
                                "200",
                                ResponseSpec::new("ok").schema(Schema::array(Schema::string())),
                            ),
                    ),
            )
            .path(
                PathItem::builder("/pets/{petId}").operation(
                    Operation::builder(Method::GET)
                        .operation_id("getPet")
                        .controller("pet_detail")
                        .parameter(Parameter::path("petId", ParameterType::Integer))
                        .response("default", ResponseSpec::new("any")),
                ),
            )
            .path(PathItem::builder("/pets/mine").pipe("mine"))
            .build()
    }

    #[test]
    fn test_interface_style_parse() {
        assert_eq!("auto-detect".parse::<InterfaceStyle>(), Ok(InterfaceStyle::AutoDetect));
        assert!("magic".parse::<InterfaceStyle>().is_err());
        assert_eq!(InterfaceStyle::Pipe.to_string(), "pipe");
    }

    #[test]
    fn test_security_inheritance() {
        let spec = spec();
        let create = spec.operation_by_id("createPet").unwrap();
        let list = spec.operation_by_id("listPets").unwrap();
        assert_eq!(create.security().len(), 1);
        assert!(list.security().is_empty());
    }

    #[test]
    fn test_produces_and_directive_inheritance() {
        let spec = spec();
        let list = spec.operation_by_id("listPets").unwrap();
        let get = spec.operation_by_id("getPet").unwrap();
        assert_eq!(list.produces(), ["text/plain"]);
        assert_eq!(get.produces(), ["application/json"]);
        assert_eq!(list.controller(), Some("pets"));
        assert_eq!(get.controller(), Some("pet_detail"));
    }

    #[test]
    fn test_literal_path_preferred_over_template() {
        let spec = spec();
        let (path, params) = spec.match_path("/pets/mine").unwrap();
        assert_eq!(path.template(), "/pets/mine");
        assert!(params.is_empty());

        let (path, params) = spec.match_path("/pets/42").unwrap();
        assert_eq!(path.template(), "/pets/{petId}");
        assert_eq!(params.get("petId").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_allowed_methods_sorted() {
        let spec = spec();
        let (path, _) = spec.match_path("/pets").unwrap();
        assert_eq!(path.allowed_methods(), ["GET", "POST"]);
    }

    #[test]
    fn test_response_for_falls_back_to_default() {
        let spec = spec();
        let get = spec.operation_by_id("getPet").unwrap();
        assert!(get.response_for(404).is_some());
        let create = spec.operation_by_id("createPet").unwrap();
        assert!(create.response_for(404).is_none());
    }

    #[test]
    fn test_validate_clean_document() {
        let results = spec().validate();
        assert!(results.errors.is_empty(), "{:?}", results.errors);
    }

    #[test]
    fn test_validate_reports_problems() {
        let spec = ApiSpec::builder("broken")
            .path(
                PathItem::builder("/a/{id}")
                    .operation(
                        Operation::builder(Method::GET)
                            .operation_id("dup")
                            .security(requirement(&["nope"])),
                    )
                    .operation(
                        Operation::builder(Method::PUT)
                            .operation_id("dup")
                            .parameter(Parameter::path("id", ParameterType::String))
                            .response("200", ResponseSpec::new("ok")),
                    ),
            )
            .build();

        let results = spec.validate();
        let codes: Vec<&str> = results.errors.iter().map(|e| e.code.as_str()).collect();
        assert!(codes.contains(&"DUPLICATE_OPERATIONID"));
        assert!(codes.contains(&"UNRESOLVABLE_SECURITY_DEFINITION"));
        assert!(codes.contains(&"MISSING_PATH_PARAMETER_DEFINITION"));
        assert_eq!(results.warnings.len(), 1);
        assert_eq!(results.warnings[0].code, "MISSING_RESPONSES");
    }

    #[test]
    fn test_validate_response() {
        let spec = spec();
        let list = spec.operation_by_id("listPets").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let results = list.validate_response(StatusCode::OK, &headers, &Bytes::from_static(b"hello"));
        assert_eq!(results.errors[0].code, "INVALID_TYPE");

        let results = list.validate_response(StatusCode::NOT_FOUND, &headers, &Bytes::new());
        assert_eq!(results.errors[0].code, "INVALID_RESPONSE_CODE");

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let results = list.validate_response(StatusCode::OK, &headers, &Bytes::from_static(b"[\"a\"]"));
        assert_eq!(results.errors[0].code, "INVALID_CONTENT_TYPE");
    }

    #[test]
    fn test_example_for_ignores_parameters() {
        let response = ResponseSpec::new("ok").example("application/json", json!({"a": 1}));
        assert_eq!(
            response.example_for("application/json; charset=utf-8"),
            Some(&json!({"a": 1}))
        );
        assert!(response.example_for("text/plain").is_none());
    }
}

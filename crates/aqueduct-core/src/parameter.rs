//! Parameter descriptors.

use crate::request::PipeRequest;
use crate::schema::Schema;
use crate::validation::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Where a parameter is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterLocation {
    /// The URI query string.
    Query,
    /// The whole request body.
    Body,
    /// A field of a url-encoded or multipart form body.
    FormData,
    /// A request header.
    Header,
    /// A templated path segment.
    Path,
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::Body => "body",
            Self::FormData => "formData",
            Self::Header => "header",
            Self::Path => "path",
        })
    }
}

/// The declared type of a non-body parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    /// Free text.
    String,
    /// Integral number.
    Integer,
    /// Any number.
    Number,
    /// `true` / `false`.
    Boolean,
    /// Comma separated values.
    Array,
    /// A JSON object (body parameters).
    Object,
    /// An uploaded file (form data only).
    File,
}

/// A parameter descriptor owned by an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    name: String,
    #[serde(rename = "in")]
    location: ParameterLocation,
    #[serde(rename = "type")]
    param_type: ParameterType,
    #[serde(default)]
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema: Option<Schema>,
}

impl Parameter {
    /// Creates a parameter descriptor.
    pub fn new(
        name: impl Into<String>,
        location: ParameterLocation,
        param_type: ParameterType,
    ) -> Self {
        Self {
            name: name.into(),
            location,
            param_type,
            required: location == ParameterLocation::Path,
            schema: None,
        }
    }

    /// Creates a query parameter.
    pub fn query(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self::new(name, ParameterLocation::Query, param_type)
    }

    /// Creates a header parameter.
    pub fn header(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self::new(name, ParameterLocation::Header, param_type)
    }

    /// Creates a (required) path parameter.
    pub fn path(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self::new(name, ParameterLocation::Path, param_type)
    }

    /// Creates a form field parameter.
    pub fn form_data(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self::new(name, ParameterLocation::FormData, param_type)
    }

    /// Creates a file upload parameter.
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, ParameterLocation::FormData, ParameterType::File)
    }

    /// Creates a body parameter validated against `schema`.
    pub fn body(name: impl Into<String>, schema: Schema) -> Self {
        let mut param = Self::new(name, ParameterLocation::Body, ParameterType::Object);
        param.schema = Some(schema);
        param
    }

    /// Marks the parameter as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Overrides the schema derived from the parameter type.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Returns the parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns where the parameter is carried.
    #[must_use]
    pub fn location(&self) -> ParameterLocation {
        self.location
    }

    /// Returns the declared type.
    #[must_use]
    pub fn param_type(&self) -> ParameterType {
        self.param_type
    }

    /// Returns true for `formData` parameters of type `file`.
    #[must_use]
    pub fn is_file_upload(&self) -> bool {
        self.location == ParameterLocation::FormData && self.param_type == ParameterType::File
    }

    /// Extracts this parameter's value from a request.
    ///
    /// Raw string values are coerced to the declared type when they parse;
    /// values that do not parse are returned unchanged so validation can
    /// report them. Returns `None` when the request does not carry the
    /// parameter.
    #[must_use]
    pub fn value(&self, req: &PipeRequest) -> Option<Value> {
        let raw = match self.location {
            ParameterLocation::Query => match req.query() {
                Some(query) => query.get(&self.name).cloned(),
                None => req.parse_query_string().remove(&self.name),
            },
            ParameterLocation::Header => req
                .header(&self.name)
                .map(|v| Value::String(v.to_string())),
            ParameterLocation::Path => req
                .path_params()
                .get(&self.name)
                .map(|v| Value::String(v.clone())),
            ParameterLocation::Body => return req.body().cloned(),
            ParameterLocation::FormData if self.param_type == ParameterType::File => {
                return req.files().and_then(|files| files.get(&self.name).cloned());
            }
            ParameterLocation::FormData => req
                .body()
                .and_then(Value::as_object)
                .and_then(|form| form.get(&self.name).cloned()),
        }?;
        Some(self.coerce(raw))
    }

    fn coerce(&self, raw: Value) -> Value {
        let Value::String(s) = &raw else {
            return raw;
        };
        let coerced = match self.param_type {
            ParameterType::Integer => s.parse::<i64>().ok().map(Value::from),
            ParameterType::Number => s
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            ParameterType::Boolean => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            ParameterType::Array => Some(Value::Array(
                s.split(',').map(|item| Value::String(item.to_string())).collect(),
            )),
            ParameterType::Object => serde_json::from_str(s).ok(),
            ParameterType::String | ParameterType::File => None,
        };
        coerced.unwrap_or(raw)
    }

    /// Validates this parameter's value on a request.
    #[must_use]
    pub fn validate(&self, req: &PipeRequest) -> Vec<ValidationError> {
        let prefix = format!("{}.{}", self.location, self.name);
        let Some(value) = self.value(req) else {
            if self.required {
                return vec![ValidationError::new(
                    "REQUIRED",
                    prefix,
                    format!("Value is required but was not provided for '{}'", self.name),
                )];
            }
            return Vec::new();
        };

        let derived;
        let schema = match &self.schema {
            Some(schema) => schema,
            None => {
                derived = match self.param_type {
                    ParameterType::String => Schema::string(),
                    ParameterType::Integer => Schema::integer(),
                    ParameterType::Number => Schema::number(),
                    ParameterType::Boolean => Schema::boolean(),
                    ParameterType::Array => Schema::array(Schema::any()),
                    ParameterType::Object => Schema::object(Vec::new()),
                    ParameterType::File => Schema::any(),
                };
                &derived
            }
        };

        schema
            .validate(&value)
            .into_iter()
            .map(|mut err| {
                err.path = format!("{prefix}{}", err.path.trim_start_matches('$'));
                err
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Uri};
    use serde_json::json;
    use std::collections::HashMap;

    fn request(uri: &'static str) -> PipeRequest {
        PipeRequest::new(Method::GET, Uri::from_static(uri))
    }

    #[test]
    fn test_query_value_is_coerced() {
        let req = request("/pets?limit=10&tags=a,b");
        assert_eq!(
            Parameter::query("limit", ParameterType::Integer).value(&req),
            Some(json!(10))
        );
        assert_eq!(
            Parameter::query("tags", ParameterType::Array).value(&req),
            Some(json!(["a", "b"]))
        );
        assert_eq!(Parameter::query("missing", ParameterType::String).value(&req), None);
    }

    #[test]
    fn test_unparseable_value_is_kept() {
        let req = request("/pets?limit=ten");
        let param = Parameter::query("limit", ParameterType::Integer);
        assert_eq!(param.value(&req), Some(json!("ten")));
        assert_eq!(param.validate(&req)[0].code, "INVALID_TYPE");
        assert_eq!(param.validate(&req)[0].path, "query.limit");
    }

    #[test]
    fn test_path_and_form_values() {
        let mut req = request("/pets/7");
        req.set_path_params(HashMap::from([("petId".to_string(), "7".to_string())]));
        req.set_body(json!({"name": "Rex"}));

        assert_eq!(Parameter::path("petId", ParameterType::Integer).value(&req), Some(json!(7)));
        assert_eq!(
            Parameter::form_data("name", ParameterType::String).value(&req),
            Some(json!("Rex"))
        );
    }

    #[test]
    fn test_required_missing() {
        let req = request("/pets");
        let errors = Parameter::header("x-request-id", ParameterType::String)
            .required()
            .validate(&req);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "REQUIRED");
        assert_eq!(errors[0].path, "header.x-request-id");
    }

    #[test]
    fn test_body_schema_paths() {
        let mut req = request("/pets");
        req.set_body(json!({"name": 3}));
        let param = Parameter::body(
            "pet",
            Schema::object(vec![("name", Schema::string().required())]),
        );
        let errors = param.validate(&req);
        assert_eq!(errors[0].path, "body.pet.name");
    }

    #[test]
    fn test_file_upload_detection() {
        assert!(Parameter::file("upload").is_file_upload());
        assert!(!Parameter::form_data("upload", ParameterType::String).is_file_upload());
    }
}

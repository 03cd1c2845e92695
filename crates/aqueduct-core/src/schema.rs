//! A compact JSON schema model.
//!
//! [`Schema`] covers the subset of JSON Schema used by parameter, body and
//! response declarations: primitive types with bounds, arrays, objects with
//! required properties, enumerations and examples. It validates values and
//! produces deterministic sample values for mock responses.
//!
//! # Example
//!
//! ```
//! use aqueduct_core::Schema;
//! use serde_json::json;
//!
//! let pet = Schema::object(vec![
//!     ("id", Schema::integer().required()),
//!     ("name", Schema::string().min_length(1).required()),
//!     ("tag", Schema::string()),
//! ]);
//!
//! assert!(pet.validate(&json!({"id": 1, "name": "Rex"})).is_empty());
//! assert_eq!(pet.validate(&json!({"name": ""})).len(), 2);
//! assert_eq!(pet.sample(), json!({"id": 0, "name": "string", "tag": "string"}));
//! ```

use crate::validation::ValidationError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A schema node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(flatten)]
    kind: SchemaKind,
    #[serde(default)]
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    example: Option<Value>,
}

/// The type-specific part of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaKind {
    /// String values.
    String {
        /// Minimum length in characters.
        #[serde(default)]
        min_length: Option<usize>,
        /// Maximum length in characters.
        #[serde(default)]
        max_length: Option<usize>,
        /// Allowed values; empty means unrestricted.
        #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
        allowed: Vec<String>,
    },
    /// Integral numbers.
    Integer {
        /// Inclusive lower bound.
        #[serde(default)]
        minimum: Option<i64>,
        /// Inclusive upper bound.
        #[serde(default)]
        maximum: Option<i64>,
    },
    /// Any number.
    Number {
        /// Inclusive lower bound.
        #[serde(default)]
        minimum: Option<f64>,
        /// Inclusive upper bound.
        #[serde(default)]
        maximum: Option<f64>,
    },
    /// `true` or `false`.
    Boolean,
    /// Homogeneous arrays.
    Array {
        /// Item schema.
        items: Box<Schema>,
        /// Minimum number of items.
        #[serde(default)]
        min_items: Option<usize>,
        /// Maximum number of items.
        #[serde(default)]
        max_items: Option<usize>,
    },
    /// Objects with declared properties. Undeclared properties are allowed.
    Object {
        /// Properties in declaration order.
        #[serde(default)]
        properties: IndexMap<String, Schema>,
    },
    /// Anything.
    Any,
    /// `null` only.
    Null,
}

impl Schema {
    fn of(kind: SchemaKind) -> Self {
        Self {
            kind,
            required: false,
            example: None,
        }
    }

    /// Creates a string schema.
    #[must_use]
    pub fn string() -> Self {
        Self::of(SchemaKind::String {
            min_length: None,
            max_length: None,
            allowed: Vec::new(),
        })
    }

    /// Creates an integer schema.
    #[must_use]
    pub fn integer() -> Self {
        Self::of(SchemaKind::Integer {
            minimum: None,
            maximum: None,
        })
    }

    /// Creates a number schema.
    #[must_use]
    pub fn number() -> Self {
        Self::of(SchemaKind::Number {
            minimum: None,
            maximum: None,
        })
    }

    /// Creates a boolean schema.
    #[must_use]
    pub fn boolean() -> Self {
        Self::of(SchemaKind::Boolean)
    }

    /// Creates an array schema.
    #[must_use]
    pub fn array(items: Schema) -> Self {
        Self::of(SchemaKind::Array {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        })
    }

    /// Creates an object schema from `(name, schema)` pairs.
    ///
    /// Properties marked [`required`](Self::required) are required properties
    /// of the object.
    #[must_use]
    pub fn object(properties: Vec<(&str, Schema)>) -> Self {
        Self::of(SchemaKind::Object {
            properties: properties
                .into_iter()
                .map(|(name, schema)| (name.to_string(), schema))
                .collect(),
        })
    }

    /// Creates a schema accepting any value.
    #[must_use]
    pub fn any() -> Self {
        Self::of(SchemaKind::Any)
    }

    /// Creates a schema accepting only `null`.
    #[must_use]
    pub fn null() -> Self {
        Self::of(SchemaKind::Null)
    }

    /// Marks this schema as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Attaches an example value, used verbatim by [`sample`](Self::sample).
    #[must_use]
    pub fn example(mut self, example: Value) -> Self {
        self.example = Some(example);
        self
    }

    /// Restricts a string schema to the given values.
    #[must_use]
    pub fn one_of(mut self, values: &[&str]) -> Self {
        if let SchemaKind::String { allowed, .. } = &mut self.kind {
            *allowed = values.iter().map(ToString::to_string).collect();
        }
        self
    }

    /// Sets the minimum length of a string schema.
    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        if let SchemaKind::String { min_length, .. } = &mut self.kind {
            *min_length = Some(len);
        }
        self
    }

    /// Sets the maximum length of a string schema.
    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        if let SchemaKind::String { max_length, .. } = &mut self.kind {
            *max_length = Some(len);
        }
        self
    }

    /// Sets the inclusive lower bound of an integer schema.
    #[must_use]
    pub fn minimum(mut self, min: i64) -> Self {
        match &mut self.kind {
            SchemaKind::Integer { minimum, .. } => *minimum = Some(min),
            #[allow(clippy::cast_precision_loss)]
            SchemaKind::Number { minimum, .. } => *minimum = Some(min as f64),
            _ => {}
        }
        self
    }

    /// Sets the inclusive upper bound of an integer schema.
    #[must_use]
    pub fn maximum(mut self, max: i64) -> Self {
        match &mut self.kind {
            SchemaKind::Integer { maximum, .. } => *maximum = Some(max),
            #[allow(clippy::cast_precision_loss)]
            SchemaKind::Number { maximum, .. } => *maximum = Some(max as f64),
            _ => {}
        }
        self
    }

    /// Sets the minimum number of items of an array schema.
    #[must_use]
    pub fn min_items(mut self, min: usize) -> Self {
        if let SchemaKind::Array { min_items, .. } = &mut self.kind {
            *min_items = Some(min);
        }
        self
    }

    /// Sets the maximum number of items of an array schema.
    #[must_use]
    pub fn max_items(mut self, max: usize) -> Self {
        if let SchemaKind::Array { max_items, .. } = &mut self.kind {
            *max_items = Some(max);
        }
        self
    }

    /// Returns the type-specific part of the schema.
    #[must_use]
    pub fn kind(&self) -> &SchemaKind {
        &self.kind
    }

    /// Validates a value, returning every finding (empty when valid).
    #[must_use]
    pub fn validate(&self, value: &Value) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.validate_at(value, "$", &mut errors);
        errors
    }

    fn validate_at(&self, value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
        if value.is_null() {
            if !matches!(self.kind, SchemaKind::Null | SchemaKind::Any) && self.required {
                errors.push(ValidationError::new(
                    "REQUIRED",
                    path,
                    "required value is null",
                ));
            }
            return;
        }

        match &self.kind {
            SchemaKind::String {
                min_length,
                max_length,
                allowed,
            } => {
                let Some(s) = value.as_str() else {
                    errors.push(type_error(path, "string", value));
                    return;
                };
                let len = s.chars().count();
                if let Some(min) = min_length.filter(|min| len < *min) {
                    errors.push(ValidationError::new(
                        "MIN_LENGTH",
                        path,
                        format!("string length {len} is less than minimum {min}"),
                    ));
                }
                if let Some(max) = max_length.filter(|max| len > *max) {
                    errors.push(ValidationError::new(
                        "MAX_LENGTH",
                        path,
                        format!("string length {len} is greater than maximum {max}"),
                    ));
                }
                if !allowed.is_empty() && !allowed.iter().any(|a| a == s) {
                    errors.push(ValidationError::new(
                        "ENUM_MISMATCH",
                        path,
                        format!("'{s}' is not one of {}", allowed.join(", ")),
                    ));
                }
            }
            SchemaKind::Integer { minimum, maximum } => {
                let Some(n) = value.as_i64() else {
                    errors.push(type_error(path, "integer", value));
                    return;
                };
                check_bounds(n, *minimum, *maximum, path, errors);
            }
            SchemaKind::Number { minimum, maximum } => {
                let Some(n) = value.as_f64() else {
                    errors.push(type_error(path, "number", value));
                    return;
                };
                check_bounds(n, *minimum, *maximum, path, errors);
            }
            SchemaKind::Boolean => {
                if !value.is_boolean() {
                    errors.push(type_error(path, "boolean", value));
                }
            }
            SchemaKind::Array {
                items,
                min_items,
                max_items,
            } => {
                let Some(arr) = value.as_array() else {
                    errors.push(type_error(path, "array", value));
                    return;
                };
                if let Some(min) = min_items.filter(|min| arr.len() < *min) {
                    errors.push(ValidationError::new(
                        "ARRAY_LENGTH_SHORT",
                        path,
                        format!("array has {} items, fewer than minimum {min}", arr.len()),
                    ));
                }
                if let Some(max) = max_items.filter(|max| arr.len() > *max) {
                    errors.push(ValidationError::new(
                        "ARRAY_LENGTH_LONG",
                        path,
                        format!("array has {} items, more than maximum {max}", arr.len()),
                    ));
                }
                for (i, item) in arr.iter().enumerate() {
                    items.validate_at(item, &format!("{path}[{i}]"), errors);
                }
            }
            SchemaKind::Object { properties } => {
                let Some(obj) = value.as_object() else {
                    errors.push(type_error(path, "object", value));
                    return;
                };
                for (name, schema) in properties {
                    let prop_path = format!("{path}.{name}");
                    match obj.get(name) {
                        Some(v) => schema.validate_at(v, &prop_path, errors),
                        None if schema.required => errors.push(ValidationError::new(
                            "OBJECT_MISSING_REQUIRED_PROPERTY",
                            prop_path,
                            format!("missing required property '{name}'"),
                        )),
                        None => {}
                    }
                }
            }
            SchemaKind::Any => {}
            SchemaKind::Null => errors.push(type_error(path, "null", value)),
        }
    }

    /// Produces a deterministic value that satisfies the schema.
    ///
    /// Declared examples win. Otherwise strings sample as `"string"` (padded
    /// or truncated to the length bounds, or the first allowed value),
    /// numbers as their lower bound or zero, booleans as `true`, arrays as
    /// `max(min_items, 1)` item samples and objects as a sample of every
    /// declared property.
    #[must_use]
    pub fn sample(&self) -> Value {
        if let Some(example) = &self.example {
            return example.clone();
        }

        match &self.kind {
            SchemaKind::String {
                min_length,
                max_length,
                allowed,
            } => {
                if let Some(first) = allowed.first() {
                    return Value::String(first.clone());
                }
                let mut s = "string".to_string();
                if let Some(max) = max_length {
                    s.truncate(*max);
                }
                if let Some(min) = min_length {
                    while s.chars().count() < *min {
                        s.push('s');
                    }
                }
                Value::String(s)
            }
            SchemaKind::Integer { minimum, maximum } => {
                let n = minimum.unwrap_or_else(|| maximum.map_or(0, |max| max.min(0)));
                Value::from(n)
            }
            SchemaKind::Number { minimum, maximum } => {
                let n = minimum.unwrap_or_else(|| maximum.map_or(0.0, |max| max.min(0.0)));
                Value::from(n)
            }
            SchemaKind::Boolean => Value::Bool(true),
            SchemaKind::Array {
                items, min_items, ..
            } => {
                let count = min_items.unwrap_or(1).max(1);
                Value::Array((0..count).map(|_| items.sample()).collect())
            }
            SchemaKind::Object { properties } => Value::Object(
                properties
                    .iter()
                    .map(|(name, schema)| (name.clone(), schema.sample()))
                    .collect(),
            ),
            SchemaKind::Any | SchemaKind::Null => Value::Null,
        }
    }
}

fn check_bounds<T: PartialOrd + std::fmt::Display + Copy>(
    n: T,
    minimum: Option<T>,
    maximum: Option<T>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(min) = minimum.filter(|min| n < *min) {
        errors.push(ValidationError::new(
            "MINIMUM",
            path,
            format!("value {n} is less than minimum {min}"),
        ));
    }
    if let Some(max) = maximum.filter(|max| n > *max) {
        errors.push(ValidationError::new(
            "MAXIMUM",
            path,
            format!("value {n} is greater than maximum {max}"),
        ));
    }
}

fn type_error(path: &str, expected: &str, value: &Value) -> ValidationError {
    ValidationError::new(
        "INVALID_TYPE",
        path,
        format!("expected {expected}, got {}", value_type_name(value)),
    )
}

/// Returns the JSON type name of a value.
pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_bounds() {
        let schema = Schema::string().min_length(2).max_length(4);
        assert!(schema.validate(&json!("abc")).is_empty());
        assert_eq!(schema.validate(&json!("a"))[0].code, "MIN_LENGTH");
        assert_eq!(schema.validate(&json!("abcde"))[0].code, "MAX_LENGTH");
        assert_eq!(schema.validate(&json!(3))[0].code, "INVALID_TYPE");
    }

    #[test]
    fn test_enum() {
        let schema = Schema::string().one_of(&["available", "sold"]);
        assert!(schema.validate(&json!("sold")).is_empty());
        assert_eq!(schema.validate(&json!("lost"))[0].code, "ENUM_MISMATCH");
        assert_eq!(schema.sample(), json!("available"));
    }

    #[test]
    fn test_integer_bounds() {
        let schema = Schema::integer().minimum(1).maximum(10);
        assert!(schema.validate(&json!(5)).is_empty());
        assert_eq!(schema.validate(&json!(0))[0].code, "MINIMUM");
        assert_eq!(schema.validate(&json!(11))[0].code, "MAXIMUM");
        assert_eq!(schema.validate(&json!(1.5))[0].code, "INVALID_TYPE");
        assert_eq!(schema.sample(), json!(1));
    }

    #[test]
    fn test_nested_paths() {
        let schema = Schema::array(Schema::object(vec![("id", Schema::integer().required())]));
        let errors = schema.validate(&json!([{"id": 1}, {"id": "x"}, {}]));
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].path, "$[1].id");
        assert_eq!(errors[1].path, "$[2].id");
        assert_eq!(errors[1].code, "OBJECT_MISSING_REQUIRED_PROPERTY");
    }

    #[test]
    fn test_required_null() {
        assert_eq!(Schema::string().required().validate(&Value::Null).len(), 1);
        assert!(Schema::string().validate(&Value::Null).is_empty());
    }

    #[test]
    fn test_sample_prefers_example() {
        let schema = Schema::object(vec![("name", Schema::string())]).example(json!({"name": "Rex"}));
        assert_eq!(schema.sample(), json!({"name": "Rex"}));
    }

    #[test]
    fn test_sample_validates() {
        let schema = Schema::object(vec![
            ("id", Schema::integer().minimum(100).required()),
            ("tags", Schema::array(Schema::string().max_length(3)).min_items(2)),
            ("code", Schema::string().min_length(8)),
            ("ok", Schema::boolean()),
        ]);
        let sample = schema.sample();
        assert!(schema.validate(&sample).is_empty(), "sample {sample} should validate");
        assert_eq!(sample["tags"], json!(["str", "str"]));
    }

    #[test]
    fn test_deserialize() {
        let schema: Schema = serde_json::from_value(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "required": true, "min_length": 1}
            }
        }))
        .unwrap();
        assert_eq!(schema.validate(&json!({}))[0].code, "OBJECT_MISSING_REQUIRED_PROPERTY");
    }
}

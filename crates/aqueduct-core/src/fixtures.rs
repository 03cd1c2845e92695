//! Test fixtures.
//!
//! A small pet store document exercising every feature the pipeline relies
//! on: controller directives, parameters in every location, file uploads,
//! security alternatives and response examples.
//!
//! # Example
//!
//! ```
//! use aqueduct_core::fixtures;
//!
//! let spec = fixtures::petstore_spec();
//! assert!(spec.operation_by_id("getPet").is_some());
//! assert!(spec.validate().errors.is_empty());
//! ```

use crate::parameter::{Parameter, ParameterType};
use crate::schema::Schema;
use crate::spec::{
    requirement, scoped_requirement, ApiKeyLocation, ApiSpec, Operation, PathItem, ResponseSpec,
    SecurityScheme,
};
use http::Method;
use serde_json::json;

/// Creates the pet store document.
///
/// | Operation | Route | Notes |
/// |---|---|---|
/// | `listPets` | `GET /pets` | query `limit`, `tags`; no security |
/// | `createPet` | `POST /pets` | body `pet`; `api_key` |
/// | `getPet` | `GET /pets/{petId}` | example response; `api_key` OR `query_key` |
/// | `deletePet` | `DELETE /pets/{petId}` | `petstore_auth` with `write:pets` |
/// | `uploadPhoto` | `POST /pets/{petId}/photo` | file upload |
/// | `health` | `GET /health` | path pipe `health`, no controller |
#[must_use]
pub fn petstore_spec() -> ApiSpec {
    ApiSpec::builder("Pet Store")
        .version("1.0.0")
        .produces("application/json")
        .security_definition(
            "api_key",
            SecurityScheme::api_key("X-API-Key", ApiKeyLocation::Header),
        )
        .security_definition(
            "query_key",
            SecurityScheme::api_key("api_key", ApiKeyLocation::Query),
        )
        .security_definition(
            "petstore_auth",
            SecurityScheme::oauth2(&["read:pets", "write:pets"]),
        )
        .path(
            PathItem::builder("/pets")
                .controller("pets")
                .operation(
                    Operation::builder(Method::GET)
                        .operation_id("listPets")
                        .parameter(Parameter::query("limit", ParameterType::Integer).schema(
                            Schema::integer().minimum(1).maximum(100),
                        ))
                        .parameter(Parameter::query("tags", ParameterType::Array))
                        .response(
                            "200",
                            ResponseSpec::new("A list of pets").schema(Schema::array(pet_schema())),
                        )
                        .response("default", ResponseSpec::new("Error").schema(error_schema())),
                )
                .operation(
                    Operation::builder(Method::POST)
                        .operation_id("createPet")
                        .security(requirement(&["api_key"]))
                        .parameter(Parameter::body("pet", new_pet_schema()).required())
                        .response("201", ResponseSpec::new("Created").schema(pet_schema())),
                ),
        )
        .path(
            PathItem::builder("/pets/{petId}")
                .controller("pets")
                .operation(
                    Operation::builder(Method::GET)
                        .operation_id("getPet")
                        .security(requirement(&["api_key"]))
                        .security(requirement(&["query_key"]))
                        .parameter(Parameter::path("petId", ParameterType::Integer))
                        .response(
                            "200",
                            ResponseSpec::new("A pet")
                                .schema(pet_schema())
                                .example("application/json", json!({"id": 7, "name": "Rex"})),
                        )
                        .response("404", ResponseSpec::new("Not found").schema(error_schema())),
                )
                .operation(
                    Operation::builder(Method::DELETE)
                        .operation_id("deletePet")
                        .security(scoped_requirement("petstore_auth", &["write:pets"]))
                        .parameter(Parameter::path("petId", ParameterType::Integer))
                        .response("204", ResponseSpec::new("Deleted")),
                ),
        )
        .path(
            PathItem::builder("/pets/{petId}/photo")
                .controller("pets")
                .operation(
                    Operation::builder(Method::POST)
                        .operation_id("uploadPhoto")
                        .parameter(Parameter::path("petId", ParameterType::Integer))
                        .parameter(Parameter::file("photo").required())
                        .response("200", ResponseSpec::new("Uploaded")),
                ),
        )
        .path(
            PathItem::builder("/health").pipe("health").operation(
                Operation::builder(Method::GET)
                    .operation_id("health")
                    .produces("text/plain")
                    .response("200", ResponseSpec::new("OK").schema(Schema::string())),
            ),
        )
        .build()
}

/// A stored pet.
#[must_use]
pub fn pet_schema() -> Schema {
    Schema::object(vec![
        ("id", Schema::integer().required()),
        ("name", Schema::string().min_length(1).required()),
        ("tag", Schema::string()),
    ])
}

/// A pet to be created.
#[must_use]
pub fn new_pet_schema() -> Schema {
    Schema::object(vec![
        ("name", Schema::string().min_length(1).required()),
        ("tag", Schema::string()),
    ])
}

/// An error body.
#[must_use]
pub fn error_schema() -> Schema {
    Schema::object(vec![
        ("code", Schema::integer().required()),
        ("message", Schema::string().required()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_petstore_is_valid() {
        let results = petstore_spec().validate();
        assert!(results.errors.is_empty(), "{:?}", results.errors);
        assert!(results.warnings.is_empty(), "{:?}", results.warnings);
    }

    #[test]
    fn test_petstore_operations() {
        let spec = petstore_spec();
        assert_eq!(spec.operations().count(), 6);
        let get = spec.operation_by_id("getPet").unwrap();
        assert_eq!(get.security().len(), 2);
        assert_eq!(get.controller(), Some("pets"));
        assert!(spec.operation_by_id("listPets").unwrap().security().is_empty());
    }
}

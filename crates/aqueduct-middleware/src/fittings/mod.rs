//! The system fittings.
//!
//! | Type | Fitting |
//! |---|---|
//! | `swagger_params_parser` | [`ParamsParserFitting`] |
//! | `swagger_security` | [`SecurityFitting`] |
//! | `swagger_validator` | [`ValidatorFitting`] |
//! | `swagger_router` | [`RouterFitting`] |

pub mod params_parser;
pub mod router;
pub mod security;
pub mod validator;

pub use params_parser::{ParamsParserFitting, PARAMS_PARSER};
pub use router::{MissingHandler, RouterFitting, RouterOptions, MOCK_STATUS_HEADER, ROUTER};
pub use security::{
    ScopeOrKey, SecurityDecision, SecurityFitting, SecurityHandler, SecurityHandlers, SECURITY,
};
pub use validator::{ValidatorFitting, VALIDATOR};

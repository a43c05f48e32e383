//! Built-in middleware stages.
//!
//! - [`cors`] - the CORS layer the dispatcher runs first on every request
//! - [`validation`] - per-route request validation injected at registration

pub mod cors;
pub mod validation;

pub use cors::{AllowedOrigin, CorsBuilder, CorsMiddleware, OriginRule};
pub use validation::{
    validator_fn, FnValidator, JsonSchemaValidator, Validation, ValidationMiddleware, ValidationTarget, Validator,
};

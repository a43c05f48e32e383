//! Request validation stage.
//!
//! A route can carry [`Validation`] objects. Each becomes a critical
//! middleware entry, placed before any middleware added with
//! `RouteHandle::middleware`. The entry pulls the body, query or params out
//! of the request, hands it to a [`Validator`], and on failure answers
//! `400` with:
//!
//! ```json
//! { "message": "Validation error", "errors": [{ "message": "...", "path": ["items", 0] }] }
//! ```
//!
//! The controller never runs for a rejected request.
//!
//! ## Validators
//!
//! | Adapter | Backing |
//! |---|---|
//! | [`JsonSchemaValidator`] | a compiled JSON Schema (`jsonschema` crate) |
//! | [`FnValidator`] | any closure, see [`validator_fn`] |

use crate::entry::MiddlewareEntry;
use crate::middleware::{Middleware, Next};
use conduit_core::{
    BoxFuture, ConduitError, ConduitResult, ParamMap, PathSegment, Request, Response, ValidationIssue,
};
use http::StatusCode;
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

/// Message sent with every `400` produced by this stage.
pub const VALIDATION_MESSAGE: &str = "Validation error";

/// Uniform validation contract.
///
/// `options` are adapter-specific and come from [`Validation::with_options`].
pub trait Validator: Send + Sync + 'static {
    /// Checks `data`, returning every issue found.
    fn validate(&self, data: &Value, options: Option<&Value>) -> Result<(), Vec<ValidationIssue>>;
}

/// A validator backed by a compiled JSON Schema.
///
/// Recognised options: `{ "abort_early": true }` keeps only the first issue.
///
/// ```
/// use conduit_middleware::stages::{JsonSchemaValidator, Validator};
/// use serde_json::json;
///
/// let validator = JsonSchemaValidator::new(&json!({
///     "type": "object",
///     "required": ["name"],
///     "properties": { "name": { "type": "string" } }
/// }))
/// .unwrap();
///
/// assert!(validator.validate(&json!({ "name": "ada" }), None).is_ok());
/// let issues = validator.validate(&json!({ "name": 7 }), None).unwrap_err();
/// assert_eq!(issues[0].dotted_path(), "name");
/// ```
pub struct JsonSchemaValidator {
    schema: JSONSchema,
}

impl JsonSchemaValidator {
    /// Compiles `schema`.
    pub fn new(schema: &Value) -> ConduitResult<Self> {
        let schema = JSONSchema::compile(schema).map_err(|e| ConduitError::InvalidSchema(e.to_string()))?;
        Ok(Self { schema })
    }
}

impl Validator for JsonSchemaValidator {
    fn validate(&self, data: &Value, options: Option<&Value>) -> Result<(), Vec<ValidationIssue>> {
        let Err(errors) = self.schema.validate(data) else {
            return Ok(());
        };

        let abort_early = options
            .and_then(|o| o.get("abort_early"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let limit = if abort_early { 1 } else { usize::MAX };

        let issues = errors
            .take(limit)
            .map(|error| ValidationIssue {
                message: error.to_string(),
                path: pointer_segments(&error.instance_path.to_string()),
            })
            .collect();
        Err(issues)
    }
}

impl fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaValidator").finish_non_exhaustive()
    }
}

/// Splits a JSON pointer such as `/items/0/name` into path segments.
fn pointer_segments(pointer: &str) -> Vec<PathSegment> {
    pointer
        .split('/')
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| match chunk.parse::<usize>() {
            Ok(index) => PathSegment::Index(index),
            Err(_) => PathSegment::Key(chunk.replace("~1", "/").replace("~0", "~")),
        })
        .collect()
}

/// A validator backed by a closure. See [`validator_fn`].
pub struct FnValidator<F> {
    func: F,
}

/// Creates a validator from a closure.
///
/// ```
/// use conduit_core::ValidationIssue;
/// use conduit_middleware::stages::{validator_fn, Validator};
/// use serde_json::json;
///
/// let adult = validator_fn(|data, _options| match data["age"].as_u64() {
///     Some(age) if age >= 18 => Ok(()),
///     _ => Err(vec![ValidationIssue::new("must be an adult").at("age")]),
/// });
///
/// assert!(adult.validate(&json!({ "age": 30 }), None).is_ok());
/// assert!(adult.validate(&json!({ "age": 3 }), None).is_err());
/// ```
pub fn validator_fn<F>(func: F) -> FnValidator<F>
where
    F: Fn(&Value, Option<&Value>) -> Result<(), Vec<ValidationIssue>> + Send + Sync + 'static,
{
    FnValidator { func }
}

impl<F> Validator for FnValidator<F>
where
    F: Fn(&Value, Option<&Value>) -> Result<(), Vec<ValidationIssue>> + Send + Sync + 'static,
{
    fn validate(&self, data: &Value, options: Option<&Value>) -> Result<(), Vec<ValidationIssue>> {
        (self.func)(data, options)
    }
}

/// Which part of the request is validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationTarget {
    /// The parsed body.
    #[default]
    Body,
    /// Query parameters as an object of strings.
    Query,
    /// Path parameters as an object of strings.
    Params,
}

impl ValidationTarget {
    /// Returns the lowercase name used in logs and metric labels.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Query => "query",
            Self::Params => "params",
        }
    }

    /// Extracts the target value from a request.
    pub fn extract(self, req: &Request) -> Value {
        match self {
            Self::Body => req.body().clone(),
            Self::Query => params_to_value(req.query()),
            Self::Params => params_to_value(req.params()),
        }
    }
}

fn params_to_value(params: &ParamMap) -> Value {
    let map: Map<String, Value> = params
        .iter()
        .map(|(key, value)| (key.clone(), value.clone().map_or(Value::Null, Value::String)))
        .collect();
    Value::Object(map)
}

/// A validation attached to a route.
#[derive(Clone)]
pub struct Validation {
    validator: Arc<dyn Validator>,
    options: Option<Value>,
    target: ValidationTarget,
}

impl Validation {
    /// Validates the request body with `validator`.
    pub fn new<V: Validator>(validator: V) -> Self {
        Self {
            validator: Arc::new(validator),
            options: None,
            target: ValidationTarget::Body,
        }
    }

    /// Validates against a JSON Schema document.
    pub fn json_schema(schema: &Value) -> ConduitResult<Self> {
        Ok(Self::new(JsonSchemaValidator::new(schema)?))
    }

    /// Sets the validated part of the request.
    #[must_use]
    pub fn target(mut self, target: ValidationTarget) -> Self {
        self.target = target;
        self
    }

    /// Passes adapter-specific options to the validator.
    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    /// Returns the validated part of the request.
    pub const fn validation_target(&self) -> ValidationTarget {
        self.target
    }

    /// Converts into a critical middleware entry.
    #[must_use]
    pub fn into_entry(self) -> MiddlewareEntry {
        MiddlewareEntry::new(ValidationMiddleware { validation: self }).critical(true)
    }
}

impl fmt::Debug for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validation")
            .field("target", &self.target)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// The middleware produced by [`Validation::into_entry`].
#[derive(Debug)]
pub struct ValidationMiddleware {
    validation: Validation,
}

impl Middleware for ValidationMiddleware {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        next: Next,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let data = self.validation.target.extract(req);
            match self.validation.validator.validate(&data, self.validation.options.as_ref()) {
                Ok(()) => {
                    next.advance();
                }
                Err(errors) => {
                    let target = self.validation.target.as_str();
                    metrics::counter!("conduit_validation_failures_total", "target" => target).increment(1);
                    tracing::debug!(
                        validated = target,
                        issues = errors.len(),
                        "request rejected by validation"
                    );
                    res.set_status(StatusCode::BAD_REQUEST)?;
                    res.json(&json!({ "message": VALIDATION_MESSAGE, "errors": errors }))?;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::HttpMethod;

    fn user_schema() -> Value {
        json!({
            "type": "object",
            "required": ["name", "tags"],
            "properties": {
                "name": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } }
            }
        })
    }

    #[test]
    fn test_pointer_segments() {
        assert_eq!(
            pointer_segments("/items/0/a~1b"),
            vec![
                PathSegment::Key("items".into()),
                PathSegment::Index(0),
                PathSegment::Key("a/b".into())
            ]
        );
        assert!(pointer_segments("").is_empty());
    }

    #[test]
    fn test_json_schema_reports_paths() {
        let validator = JsonSchemaValidator::new(&user_schema()).unwrap();
        let issues = validator
            .validate(&json!({ "name": "ada", "tags": ["ok", 5] }), None)
            .unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].path,
            vec![PathSegment::Key("tags".into()), PathSegment::Index(1)]
        );
    }

    #[test]
    fn test_abort_early_option() {
        let validator = JsonSchemaValidator::new(&user_schema()).unwrap();
        let data = json!({ "name": 1, "tags": "nope" });
        assert_eq!(validator.validate(&data, None).unwrap_err().len(), 2);
        let options = json!({ "abort_early": true });
        assert_eq!(validator.validate(&data, Some(&options)).unwrap_err().len(), 1);
    }

    #[test]
    fn test_invalid_schema() {
        let err = JsonSchemaValidator::new(&json!({ "type": 12 })).unwrap_err();
        assert!(matches!(err, ConduitError::InvalidSchema(_)));
    }

    #[test]
    fn test_target_extraction() {
        let mut req = Request::new(HttpMethod::Get, "/u/1?x=1").with_body(json!({ "a": 1 }));
        req.params_mut().insert("id".into(), Some("1".into()));
        req.params_mut().insert("tail".into(), None);
        req.query_mut().insert("x".into(), Some("1".into()));

        assert_eq!(ValidationTarget::Body.extract(&req), json!({ "a": 1 }));
        assert_eq!(ValidationTarget::Params.extract(&req), json!({ "id": "1", "tail": null }));
        assert_eq!(ValidationTarget::Query.extract(&req), json!({ "x": "1" }));
    }

    #[test]
    fn test_target_deserializes_lowercase() {
        let target: ValidationTarget = serde_json::from_str("\"query\"").unwrap();
        assert_eq!(target, ValidationTarget::Query);
    }

    #[tokio::test]
    async fn test_rejection_response() {
        let entry = Validation::json_schema(&user_schema()).unwrap().into_entry();
        assert!(entry.is_critical());
        assert_eq!(entry.name(), "validation");

        let mut req = Request::new(HttpMethod::Post, "/users").with_body(json!({ "name": "ada" }));
        let mut res = Response::new();
        let next = Next::new();
        entry.middleware().handle(&mut req, &mut res, next.clone()).await.unwrap();

        assert!(!next.is_advanced());
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["message"], "Validation error");
        assert_eq!(body["errors"].as_array().unwrap().len(), 1);
        assert!(body["errors"][0]["message"].as_str().unwrap().contains("tags"));
        assert_eq!(body["errors"][0]["path"], json!([]));
    }

    #[tokio::test]
    async fn test_query_target_passes() {
        let validation = Validation::new(validator_fn(|data, _| {
            if data.get("page").is_some() {
                Ok(())
            } else {
                Err(vec![ValidationIssue::new("page is required").at("page")])
            }
        }))
        .target(ValidationTarget::Query);
        assert_eq!(validation.validation_target(), ValidationTarget::Query);

        let mut req = Request::new(HttpMethod::Get, "/items?page=2");
        req.query_mut().insert("page".into(), Some("2".into()));
        let mut res = Response::new();
        let next = Next::new();
        validation
            .into_entry()
            .middleware()
            .handle(&mut req, &mut res, next.clone())
            .await
            .unwrap();
        assert!(next.is_advanced());
        assert!(!res.is_sent());
    }
}

//! Error types for Conduit.
//!
//! [`ConduitError`] covers both halves of the framework's failure model:
//!
//! | Phase | Variants | Handling |
//! |---|---|---|
//! | Registration | `RoutingConflict`, `PatternSyntax`, `ControllerMethod`, `InvalidSchema` | returned to the registering code |
//! | Request | `MethodNotAllowed`, `NotFound`, `Validation` | converted to 405 / 404 / 400 |
//! | Request | everything else | logged and converted to 500 |
//!
//! Application handlers return [`anyhow::Result`]; the dispatcher wraps those
//! failures in [`ConduitError::Handler`].

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using [`ConduitError`].
pub type ConduitResult<T> = Result<T, ConduitError>;

/// Standard error type for Conduit.
///
/// # Example
///
/// ```
/// use conduit_core::ConduitError;
/// use http::StatusCode;
///
/// let err = ConduitError::routing_conflict("GET", "/users");
/// assert_eq!(err.to_string(), "route \"GET /users\" is duplicated");
/// assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
/// ```
#[derive(Error, Debug)]
pub enum ConduitError {
    /// The same normalized path was registered twice for one method.
    #[error("route \"{method} {path}\" is duplicated")]
    RoutingConflict {
        /// HTTP method of the conflicting registration.
        method: String,
        /// Normalized path of the conflicting registration.
        path: String,
    },

    /// A route pattern could not be compiled.
    #[error("invalid route pattern \"{pattern}\": {reason}")]
    PatternSyntax {
        /// The offending pattern.
        pattern: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The request method is outside the supported set.
    #[error("Method {method} not allowed")]
    MethodNotAllowed {
        /// The method as received.
        method: String,
    },

    /// No registered route matched the request path.
    #[error("no route matches {path}")]
    NotFound {
        /// The query-stripped request path.
        path: String,
    },

    /// A request validator rejected the payload.
    #[error("Validation error")]
    Validation {
        /// One entry per validation issue.
        errors: Vec<ValidationIssue>,
    },

    /// A middleware neither advanced nor finished the response in time.
    #[error("middleware timed out after {timeout_ms}ms")]
    MiddlewareTimeout {
        /// The deadline that elapsed.
        timeout_ms: u64,
    },

    /// A handler, middleware or factory failed.
    #[error(transparent)]
    Handler(#[from] anyhow::Error),

    /// No dependency is registered under the key.
    #[error("Dependency '{key}' not found")]
    DependencyNotFound {
        /// The key that was requested.
        key: String,
    },

    /// A scoped dependency was resolved without a scope id.
    #[error("Scope ID is required for scoped dependency '{key}'")]
    ScopeRequired {
        /// The key that was requested.
        key: String,
    },

    /// A dependency resolved to a different type than requested.
    #[error("Dependency '{key}' is not of type {expected}")]
    DependencyType {
        /// The key that was requested.
        key: String,
        /// The requested type name.
        expected: &'static str,
    },

    /// `override_value` was called for a key that was never registered.
    #[error("Cannot override unregistered dependency '{key}'")]
    OverrideUnregistered {
        /// The key that was requested.
        key: String,
    },

    /// A controller does not expose the requested method.
    #[error("Method {method} is not bound to controller {controller}")]
    ControllerMethod {
        /// Controller type name.
        controller: &'static str,
        /// Requested method name.
        method: String,
    },

    /// The response was already finalized.
    #[error("response has already been sent")]
    ResponseAlreadySent,

    /// A header name or value could not be encoded.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A query string component could not be percent-decoded.
    #[error("failed to decode query string: {0}")]
    QueryDecode(String),

    /// A validation schema could not be compiled.
    #[error("invalid validation schema: {0}")]
    InvalidSchema(String),

    /// A response body could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConduitError {
    /// Creates a duplicate-route error.
    #[must_use]
    pub fn routing_conflict(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::RoutingConflict {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Creates a pattern compilation error.
    #[must_use]
    pub fn pattern_syntax(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PatternSyntax {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Creates a missing-dependency error.
    #[must_use]
    pub fn dependency_not_found(key: impl Into<String>) -> Self {
        Self::DependencyNotFound { key: key.into() }
    }

    /// Creates a validation error from a list of issues.
    #[must_use]
    pub fn validation(errors: Vec<ValidationIssue>) -> Self {
        Self::Validation { errors }
    }

    /// Returns `true` for errors raised while registering routes or handlers.
    #[must_use]
    pub const fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Self::RoutingConflict { .. }
                | Self::PatternSyntax { .. }
                | Self::ControllerMethod { .. }
                | Self::InvalidSchema(_)
        )
    }

    /// Returns the HTTP status code this error maps to at the dispatcher boundary.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a short machine-readable name, used as a log field and metric label.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RoutingConflict { .. } => "routing_conflict",
            Self::PatternSyntax { .. } => "pattern_syntax",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::NotFound { .. } => "not_found",
            Self::Validation { .. } => "validation",
            Self::MiddlewareTimeout { .. } => "middleware_timeout",
            Self::Handler(_) => "handler",
            Self::DependencyNotFound { .. } => "dependency_not_found",
            Self::ScopeRequired { .. } => "scope_required",
            Self::DependencyType { .. } => "dependency_type",
            Self::OverrideUnregistered { .. } => "override_unregistered",
            Self::ControllerMethod { .. } => "controller_method",
            Self::ResponseAlreadySent => "response_already_sent",
            Self::InvalidHeader(_) => "invalid_header",
            Self::QueryDecode(_) => "query_decode",
            Self::InvalidSchema(_) => "invalid_schema",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// One segment of the location of a validation issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array position.
    Index(usize),
    /// Object key.
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Key(key) => f.write_str(key),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// A single validation failure, serialized as `{ "message", "path" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Human-readable description.
    pub message: String,
    /// Location of the offending value inside the validated payload.
    pub path: Vec<PathSegment>,
}

impl ValidationIssue {
    /// Creates an issue located at the payload root.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
        }
    }

    /// Appends a path segment.
    #[must_use]
    pub fn at(mut self, segment: impl Into<PathSegment>) -> Self {
        self.path.push(segment.into());
        self
    }

    /// Returns the path joined with dots, e.g. `items.0.name`.
    #[must_use]
    pub fn dotted_path(&self) -> String {
        self.path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

//! CORS (Cross-Origin Resource Sharing) middleware.
//!
//! The dispatcher always runs this stage as the first layer. It handles two
//! kinds of requests:
//!
//! - **Preflight** (`OPTIONS`): writes the origin, credentials, methods,
//!   allowed headers, max-age and exposed headers, then answers with the
//!   success status (204 by default) and `Content-Length: 0`. With
//!   `preflight_continue` the request advances instead.
//! - **Actual requests**: writes the origin, credentials and exposed
//!   headers, then advances.
//!
//! ## Example
//!
//! ```
//! use conduit_middleware::stages::CorsMiddleware;
//! use std::time::Duration;
//!
//! let cors = CorsMiddleware::builder()
//!     .allow_origin("https://app.example.com")
//!     .allow_origin("https://admin.example.com")
//!     .allow_methods(["GET", "POST"])
//!     .allow_headers(["Content-Type", "Authorization"])
//!     .allow_credentials(true)
//!     .max_age(Duration::from_secs(600))
//!     .build();
//! # let _ = cors;
//! ```

use crate::middleware::{Middleware, Next};
use conduit_core::{BoxFuture, ConduitError, ConduitResult, HttpMethod, Request, Response};
use http::StatusCode;
use regex::Regex;
use std::time::Duration;

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Expose-Headers` header.
    pub const EXPOSE_HEADERS: &str = "access-control-expose-headers";
    /// `Access-Control-Request-Headers` header (preflight).
    pub const REQUEST_HEADERS: &str = "access-control-request-headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// Methods advertised when none are configured.
pub const DEFAULT_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

/// One accepted origin inside [`AllowedOrigin::List`].
#[derive(Debug, Clone)]
pub enum OriginRule {
    /// Exact match.
    Exact(String),
    /// Regular expression match.
    Pattern(Regex),
}

impl OriginRule {
    fn matches(&self, origin: &str) -> bool {
        match self {
            Self::Exact(allowed) => allowed == origin,
            Self::Pattern(pattern) => pattern.is_match(origin),
        }
    }
}

/// Which origins are allowed.
#[derive(Debug, Clone, Default)]
pub enum AllowedOrigin {
    /// Any origin, answered with `*`.
    #[default]
    Any,
    /// A fixed origin, always sent back as-is.
    Exact(String),
    /// Request origins matching a rule are reflected.
    List(Vec<OriginRule>),
    /// Request origins matching the pattern are reflected.
    Pattern(Regex),
    /// CORS handling is switched off; requests pass through untouched.
    Disabled,
}

impl AllowedOrigin {
    /// Returns `true` if a request origin is accepted.
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(allowed) => allowed == origin,
            Self::List(rules) => rules.iter().any(|rule| rule.matches(origin)),
            Self::Pattern(pattern) => pattern.is_match(origin),
            Self::Disabled => false,
        }
    }
}

#[derive(Debug, Clone)]
struct CorsConfig {
    origin: AllowedOrigin,
    methods: String,
    allowed_headers: Option<String>,
    exposed_headers: Option<String>,
    credentials: bool,
    max_age: Option<Duration>,
    preflight_continue: bool,
    options_success_status: StatusCode,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: AllowedOrigin::Any,
            methods: DEFAULT_METHODS.to_string(),
            allowed_headers: None,
            exposed_headers: None,
            credentials: false,
            max_age: None,
            preflight_continue: false,
            options_success_status: StatusCode::NO_CONTENT,
        }
    }
}

/// Builder for [`CorsMiddleware`].
#[derive(Debug, Clone, Default)]
pub struct CorsBuilder {
    config: CorsConfig,
}

impl CorsBuilder {
    /// Creates a builder with the permissive defaults (`*`, default methods).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the origin policy directly.
    #[must_use]
    pub fn origin(mut self, origin: AllowedOrigin) -> Self {
        self.config.origin = origin;
        self
    }

    /// Allows any origin.
    #[must_use]
    pub fn allow_any_origin(self) -> Self {
        self.origin(AllowedOrigin::Any)
    }

    /// Adds an allowed origin; the request origin is reflected when it matches.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        let rule = OriginRule::Exact(origin.into());
        match &mut self.config.origin {
            AllowedOrigin::List(rules) => rules.push(rule),
            other => *other = AllowedOrigin::List(vec![rule]),
        }
        self
    }

    /// Adds an allowed origin pattern.
    pub fn allow_origin_pattern(mut self, pattern: &str) -> ConduitResult<Self> {
        let regex = Regex::new(pattern).map_err(|e| ConduitError::pattern_syntax(pattern, e.to_string()))?;
        match &mut self.config.origin {
            AllowedOrigin::List(rules) => rules.push(OriginRule::Pattern(regex)),
            other => *other = AllowedOrigin::List(vec![OriginRule::Pattern(regex)]),
        }
        Ok(self)
    }

    /// Sets the advertised methods.
    #[must_use]
    pub fn allow_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.methods = join(methods);
        self
    }

    /// Sets the allowed request headers. When unset, the preflight's
    /// `Access-Control-Request-Headers` is reflected.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.allowed_headers = Some(join(headers));
        self
    }

    /// Sets headers exposed to browser scripts.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.exposed_headers = Some(join(headers));
        self
    }

    /// Sets whether credentials are allowed.
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.config.credentials = allow;
        self
    }

    /// Sets how long browsers may cache a preflight result.
    #[must_use]
    pub fn max_age(mut self, duration: Duration) -> Self {
        self.config.max_age = Some(duration);
        self
    }

    /// When `true`, preflight requests continue down the pipeline.
    #[must_use]
    pub fn preflight_continue(mut self, continue_: bool) -> Self {
        self.config.preflight_continue = continue_;
        self
    }

    /// Sets the status used to answer preflight requests.
    #[must_use]
    pub fn options_success_status(mut self, status: StatusCode) -> Self {
        self.config.options_success_status = status;
        self
    }

    /// Builds the middleware.
    #[must_use]
    pub fn build(self) -> CorsMiddleware {
        CorsMiddleware { config: self.config }
    }
}

fn join<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| item.as_ref().trim().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// The CORS stage.
#[derive(Debug, Clone, Default)]
pub struct CorsMiddleware {
    config: CorsConfig,
}

impl CorsMiddleware {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> CorsBuilder {
        CorsBuilder::new()
    }

    /// Returns `true` when this middleware writes no headers at all.
    pub const fn is_disabled(&self) -> bool {
        matches!(self.config.origin, AllowedOrigin::Disabled)
    }

    fn apply_origin(&self, req: &Request, res: &mut Response) -> ConduitResult<()> {
        match &self.config.origin {
            AllowedOrigin::Any => {
                res.set_header(headers::ALLOW_ORIGIN, "*")?;
            }
            AllowedOrigin::Exact(origin) => {
                res.set_header(headers::ALLOW_ORIGIN, origin)?;
                vary(res, "Origin")?;
            }
            policy @ (AllowedOrigin::List(_) | AllowedOrigin::Pattern(_)) => {
                if let Some(origin) = req.header(headers::ORIGIN) {
                    if policy.is_allowed(origin) {
                        res.set_header(headers::ALLOW_ORIGIN, origin)?;
                    }
                }
                vary(res, "Origin")?;
            }
            AllowedOrigin::Disabled => {}
        }
        Ok(())
    }

    fn apply_common(&self, res: &mut Response) -> ConduitResult<()> {
        if self.config.credentials {
            res.set_header(headers::ALLOW_CREDENTIALS, "true")?;
        }
        if let Some(exposed) = self.config.exposed_headers.as_deref().filter(|h| !h.is_empty()) {
            res.set_header(headers::EXPOSE_HEADERS, exposed)?;
        }
        Ok(())
    }

    fn apply_preflight(&self, req: &Request, res: &mut Response) -> ConduitResult<()> {
        if !self.config.methods.is_empty() {
            res.set_header(headers::ALLOW_METHODS, &self.config.methods)?;
        }

        let allowed = match &self.config.allowed_headers {
            Some(configured) => Some(configured.as_str()),
            None => {
                vary(res, "Access-Control-Request-Headers")?;
                req.header(headers::REQUEST_HEADERS)
            }
        };
        if let Some(allowed) = allowed.filter(|h| !h.is_empty()) {
            res.set_header(headers::ALLOW_HEADERS, allowed)?;
        }

        if let Some(max_age) = self.config.max_age {
            res.set_header(headers::MAX_AGE, &max_age.as_secs().to_string())?;
        }
        Ok(())
    }
}

/// Adds `field` to the response's `Vary` header unless already present.
fn vary(res: &mut Response, field: &str) -> ConduitResult<()> {
    let current = res.header(headers::VARY).unwrap_or_default().to_string();
    if current.trim() == "*" {
        return Ok(());
    }
    let present = current
        .split(',')
        .any(|existing| existing.trim().eq_ignore_ascii_case(field));
    if present {
        return Ok(());
    }
    let value = if current.trim().is_empty() {
        field.to_string()
    } else {
        format!("{current}, {field}")
    };
    res.set_header(headers::VARY, &value)?;
    Ok(())
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        next: Next,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            if self.is_disabled() {
                next.advance();
                return Ok(());
            }

            self.apply_origin(req, res)?;
            self.apply_common(res)?;

            if req.method() != HttpMethod::Options {
                next.advance();
                return Ok(());
            }

            self.apply_preflight(req, res)?;
            if self.config.preflight_continue {
                next.advance();
            } else {
                res.set_status(self.config.options_success_status)?;
                res.set_header(http::header::CONTENT_LENGTH.as_str(), "0")?;
                res.end()?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue};

    fn request(method: HttpMethod, pairs: &[(&'static str, &'static str)]) -> Request {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(*value));
        }
        Request::new(method, "/items").with_headers(headers)
    }

    async fn run(cors: &CorsMiddleware, mut req: Request) -> (Response, bool) {
        let mut res = Response::new();
        let next = Next::new();
        cors.handle(&mut req, &mut res, next.clone()).await.unwrap();
        (res, next.is_advanced())
    }

    #[tokio::test]
    async fn test_default_actual_request() {
        let cors = CorsMiddleware::default();
        let (res, advanced) = run(&cors, request(HttpMethod::Get, &[("origin", "https://a.test")])).await;
        assert!(advanced);
        assert_eq!(res.header(headers::ALLOW_ORIGIN), Some("*"));
        assert_eq!(res.header(headers::ALLOW_METHODS), None);
        assert!(!res.is_sent());
    }

    #[tokio::test]
    async fn test_default_preflight() {
        let cors = CorsMiddleware::default();
        let req = request(
            HttpMethod::Options,
            &[("origin", "https://a.test"), ("access-control-request-headers", "x-token")],
        );
        let (res, advanced) = run(&cors, req).await;
        assert!(!advanced);
        assert!(res.is_sent());
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert_eq!(res.header("content-length"), Some("0"));
        assert_eq!(res.header(headers::ALLOW_METHODS), Some(DEFAULT_METHODS));
        assert_eq!(res.header(headers::ALLOW_HEADERS), Some("x-token"));
        assert_eq!(res.header(headers::VARY), Some("Access-Control-Request-Headers"));
    }

    #[tokio::test]
    async fn test_preflight_continue() {
        let cors = CorsMiddleware::builder()
            .preflight_continue(true)
            .options_success_status(StatusCode::OK)
            .build();
        let (res, advanced) = run(&cors, request(HttpMethod::Options, &[])).await;
        assert!(advanced);
        assert!(!res.is_sent());
    }

    #[tokio::test]
    async fn test_origin_list_reflects_match() {
        let cors = CorsMiddleware::builder()
            .allow_origin("https://a.test")
            .allow_origin_pattern(r"^https://.*\.example\.com$")
            .unwrap()
            .build();

        let (res, _) = run(&cors, request(HttpMethod::Get, &[("origin", "https://api.example.com")])).await;
        assert_eq!(res.header(headers::ALLOW_ORIGIN), Some("https://api.example.com"));
        assert_eq!(res.header(headers::VARY), Some("Origin"));

        let (res, advanced) = run(&cors, request(HttpMethod::Get, &[("origin", "https://evil.test")])).await;
        assert!(advanced);
        assert_eq!(res.header(headers::ALLOW_ORIGIN), None);
        assert_eq!(res.header(headers::VARY), Some("Origin"));
    }

    #[tokio::test]
    async fn test_fixed_origin_and_extras() {
        let cors = CorsMiddleware::builder()
            .origin(AllowedOrigin::Exact("https://only.test".into()))
            .allow_credentials(true)
            .expose_headers(["X-Request-Id", "X-Total"])
            .allow_headers(["Content-Type"])
            .max_age(Duration::from_secs(600))
            .build();

        let (res, _) = run(&cors, request(HttpMethod::Options, &[])).await;
        assert_eq!(res.header(headers::ALLOW_ORIGIN), Some("https://only.test"));
        assert_eq!(res.header(headers::ALLOW_CREDENTIALS), Some("true"));
        assert_eq!(res.header(headers::EXPOSE_HEADERS), Some("X-Request-Id,X-Total"));
        assert_eq!(res.header(headers::ALLOW_HEADERS), Some("Content-Type"));
        assert_eq!(res.header(headers::MAX_AGE), Some("600"));
        assert_eq!(res.header(headers::VARY), Some("Origin"));
    }

    #[tokio::test]
    async fn test_vary_merges_fields() {
        let cors = CorsMiddleware::builder().allow_origin("https://a.test").build();
        let (res, _) = run(&cors, request(HttpMethod::Options, &[("origin", "https://a.test")])).await;
        assert_eq!(
            res.header(headers::VARY),
            Some("Origin, Access-Control-Request-Headers")
        );
    }

    #[tokio::test]
    async fn test_disabled_passes_through() {
        let cors = CorsMiddleware::builder().origin(AllowedOrigin::Disabled).build();
        let (res, advanced) = run(&cors, request(HttpMethod::Options, &[])).await;
        assert!(advanced);
        assert!(res.headers().is_empty());
    }

    #[test]
    fn test_invalid_origin_pattern() {
        let err = CorsMiddleware::builder().allow_origin_pattern("(").unwrap_err();
        assert!(matches!(err, ConduitError::PatternSyntax { .. }));
    }
}

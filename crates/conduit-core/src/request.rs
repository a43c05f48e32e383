//! Per-request state handed to middleware and handlers.

use crate::method::HttpMethod;
use http::{header, Extensions, HeaderMap};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// The dispatcher uses it as the scope id for `Scoped` dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new time-ordered request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Parameter map used for both path params and query values.
///
/// A `None` value means the key is known but the capture did not
/// participate in the match.
pub type ParamMap = IndexMap<String, Option<String>>;

/// An inbound request after its body has been buffered.
///
/// # Example
///
/// ```
/// use conduit_core::{HttpMethod, Request};
///
/// let req = Request::new(HttpMethod::Get, "/user/42?x=1");
/// assert_eq!(req.pathname(), "/user/42");
/// assert_eq!(req.raw_url(), "/user/42?x=1");
/// ```
#[derive(Debug)]
pub struct Request {
    id: RequestId,
    method: HttpMethod,
    raw_url: String,
    pathname: String,
    headers: HeaderMap,
    params: ParamMap,
    query: ParamMap,
    body: Value,
    remote_addr: Option<SocketAddr>,
    extensions: Extensions,
}

impl Request {
    /// Creates a request with an empty body and no headers.
    #[must_use]
    pub fn new(method: HttpMethod, raw_url: impl Into<String>) -> Self {
        let raw_url = raw_url.into();
        let pathname = strip_query(&raw_url).to_string();
        Self {
            id: RequestId::new(),
            method,
            raw_url,
            pathname,
            headers: HeaderMap::new(),
            params: ParamMap::new(),
            query: ParamMap::new(),
            body: Value::String(String::new()),
            remote_addr: None,
            extensions: Extensions::new(),
        }
    }

    /// Sets the request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Sets the peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.remote_addr = addr;
        self
    }

    /// Interprets a buffered body: JSON when it parses, the raw text otherwise.
    ///
    /// ```
    /// use conduit_core::Request;
    /// use serde_json::json;
    ///
    /// assert_eq!(Request::parse_body(br#"{"a":1}"#), json!({"a": 1}));
    /// assert_eq!(Request::parse_body(b"a=1"), json!("a=1"));
    /// ```
    #[must_use]
    pub fn parse_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Returns the request method.
    #[must_use]
    pub const fn method(&self) -> HttpMethod {
        self.method
    }

    /// Returns the URL as received, including the query string.
    #[must_use]
    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    /// Returns the path without its query string.
    #[must_use]
    pub fn pathname(&self) -> &str {
        &self.pathname
    }

    /// Returns the request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the `User-Agent` header.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.header(header::USER_AGENT.as_str())
    }

    /// Returns the path parameters extracted by the matched route.
    #[must_use]
    pub const fn params(&self) -> &ParamMap {
        &self.params
    }

    /// Returns a mutable reference to the path parameters.
    pub fn params_mut(&mut self) -> &mut ParamMap {
        &mut self.params
    }

    /// Returns a path parameter that participated in the match.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Option::as_deref)
    }

    /// Returns the query parameters.
    #[must_use]
    pub const fn query(&self) -> &ParamMap {
        &self.query
    }

    /// Returns a mutable reference to the query parameters.
    pub fn query_mut(&mut self) -> &mut ParamMap {
        &mut self.query
    }

    /// Returns a single query value.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.get(name).and_then(Option::as_deref)
    }

    /// Returns the body.
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.body
    }

    /// Returns a mutable reference to the body.
    pub fn body_mut(&mut self) -> &mut Value {
        &mut self.body
    }

    /// Returns the peer address when served over a socket.
    #[must_use]
    pub const fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Returns typed request-local data.
    #[must_use]
    pub const fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Returns typed request-local data mutably.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pathname_strips_query() {
        let req = Request::new(HttpMethod::Get, "/a/b?c=d&e=f");
        assert_eq!(req.pathname(), "/a/b");
        assert_eq!(req.method(), HttpMethod::Get);
    }

    #[test]
    fn test_params_accessors() {
        let mut req = Request::new(HttpMethod::Get, "/user/1");
        req.params_mut().insert("id".into(), Some("1".into()));
        req.params_mut().insert("slug".into(), None);

        assert_eq!(req.param("id"), Some("1"));
        assert_eq!(req.param("slug"), None);
        assert!(req.params().contains_key("slug"));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(Request::parse_body(b"[1,2]"), json!([1, 2]));
        assert_eq!(Request::parse_body(b""), json!(""));
        assert_eq!(Request::parse_body(b"not json"), json!("not json"));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = Request::new(HttpMethod::Get, "/");
        let b = Request::new(HttpMethod::Get, "/");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, "curl/8".parse().unwrap());
        let req = Request::new(HttpMethod::Get, "/").with_headers(headers);
        assert_eq!(req.user_agent(), Some("curl/8"));
    }
}

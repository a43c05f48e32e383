//! Test response wrapper.

use crate::error::TestError;
use bytes::Bytes;
use http::{header, HeaderMap, StatusCode};
use http_body_util::{BodyExt, Full};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// A buffered response with assertion helpers.
///
/// Assertion methods panic with a descriptive message and return `&Self`
/// so they chain.
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    /// Buffers an `http::Response`.
    pub async fn from_http(response: http::Response<Full<Bytes>>) -> Result<Self, TestError> {
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TestError::BodyRead(e.to_string()))?
            .to_bytes();

        Ok(Self::new(parts.status, parts.headers, body))
    }

    /// Creates a response from raw parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self { status, headers, body }
    }

    /// Returns the status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the status as a number.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns `true` for 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns `true` for 4xx.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Returns `true` for 5xx.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header as a string, if present and valid.
    #[must_use]
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers.get(name.as_ref()).and_then(|value| value.to_str().ok())
    }

    /// Returns `Content-Type`.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    /// Returns the body bytes.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as UTF-8 text.
    pub fn text(&self) -> Result<String, TestError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| TestError::BodyRead(format!("invalid UTF-8: {e}")))
    }

    /// Deserializes the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Parses the body as untyped JSON.
    pub fn json_value(&self) -> Result<Value, TestError> {
        self.json()
    }

    /// Returns the `message` field of a framework error body.
    pub fn message(&self) -> Result<String, TestError> {
        let value = self.json_value()?;
        Ok(value["message"].as_str().unwrap_or_default().to_string())
    }

    /// Asserts the status.
    ///
    /// # Panics
    ///
    /// Panics if the status differs.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {expected}, got {} with body {:?}",
            self.status,
            String::from_utf8_lossy(&self.body)
        );
        self
    }

    /// Asserts a header value.
    ///
    /// # Panics
    ///
    /// Panics if the header is missing or differs.
    pub fn assert_header(&self, name: impl AsRef<str>, expected: impl AsRef<str>) -> &Self {
        let name = name.as_ref();
        let expected = expected.as_ref();
        let actual = self
            .header(name)
            .unwrap_or_else(|| panic!("Header '{name}' not found"));
        assert_eq!(actual, expected, "Header '{name}': expected '{expected}', got '{actual}'");
        self
    }

    /// Asserts the body text.
    ///
    /// # Panics
    ///
    /// Panics if the body is not UTF-8 or differs.
    pub fn assert_body_eq(&self, expected: impl AsRef<str>) -> &Self {
        let body = self
            .text()
            .unwrap_or_else(|e| panic!("Body is not text: {e}"));
        assert_eq!(body, expected.as_ref(), "Body mismatch");
        self
    }

    /// Asserts the JSON body.
    ///
    /// # Panics
    ///
    /// Panics if the body is not JSON or differs.
    pub fn assert_json_eq(&self, expected: &Value) -> &Self {
        let actual: Value = self
            .json()
            .unwrap_or_else(|e| panic!("Body is not JSON: {e}"));
        assert_eq!(&actual, expected, "JSON body mismatch");
        self
    }

    /// Asserts one JSON field, addressed by a dotted path such as
    /// `errors.0.message`.
    ///
    /// # Panics
    ///
    /// Panics if the field is missing or differs.
    pub fn assert_json_field(&self, path: &str, expected: &Value) -> &Self {
        let json: Value = self
            .json()
            .unwrap_or_else(|e| panic!("Body is not JSON: {e}"));
        let actual = json_path(&json, path).unwrap_or_else(|| panic!("JSON path '{path}' not found in {json}"));
        assert_eq!(actual, expected, "JSON field '{path}'");
        self
    }
}

fn json_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

impl fmt::Debug for TestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &String::from_utf8_lossy(&self.body))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: StatusCode, body: &'static str) -> TestResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        TestResponse::new(status, headers, Bytes::from_static(body.as_bytes()))
    }

    #[test]
    fn test_status_helpers() {
        let res = response(StatusCode::NOT_FOUND, r#"{"message":"Not found"}"#);
        assert!(res.is_client_error());
        assert!(!res.is_success());
        assert_eq!(res.status_code(), 404);
        assert_eq!(res.message().unwrap(), "Not found");
    }

    #[test]
    fn test_json_field_paths() {
        let res = response(
            StatusCode::BAD_REQUEST,
            r#"{"message":"Validation error","errors":[{"message":"bad","path":["name"]}]}"#,
        );
        res.assert_status(StatusCode::BAD_REQUEST)
            .assert_content_type_is_json()
            .assert_json_field("errors.0.message", &json!("bad"))
            .assert_json_field("errors.0.path.0", &json!("name"));
    }

    #[test]
    #[should_panic(expected = "JSON path 'missing' not found")]
    fn test_missing_field_panics() {
        response(StatusCode::OK, "{}").assert_json_field("missing", &json!(1));
    }

    #[tokio::test]
    async fn test_from_http() {
        let http = http::Response::builder()
            .status(StatusCode::CREATED)
            .body(Full::new(Bytes::from_static(b"done")))
            .unwrap();
        let res = TestResponse::from_http(http).await.unwrap();
        res.assert_status(StatusCode::CREATED).assert_body_eq("done");
    }

    impl TestResponse {
        fn assert_content_type_is_json(&self) -> &Self {
            assert_eq!(self.content_type(), Some("application/json"));
            self
        }
    }
}

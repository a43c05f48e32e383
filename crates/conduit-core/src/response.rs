//! Outbound response with an explicit "sent" flag.
//!
//! A [`Response`] is finalized exactly once. After [`Response::json`],
//! [`Response::text`], [`Response::send`] or [`Response::end`] succeeds, every
//! further mutation returns [`ConduitError::ResponseAlreadySent`]. The pipeline
//! and dispatcher consult [`Response::is_sent`] before writing anything
//! themselves.

use crate::error::{ConduitError, ConduitResult};
use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use hyper::ext::ReasonPhrase;
use serde::Serialize;

/// The response a handler builds.
///
/// # Example
///
/// ```
/// use conduit_core::Response;
/// use http::StatusCode;
/// use serde_json::json;
///
/// let mut res = Response::new();
/// res.set_status(StatusCode::CREATED).unwrap();
/// res.json(&json!({ "id": 1 })).unwrap();
/// assert!(res.is_sent());
/// assert!(res.text("again").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    status_message: Option<ReasonPhrase>,
    headers: HeaderMap,
    body: Bytes,
    sent: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Creates an unsent `200 OK` response with no headers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            status_message: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            sent: false,
        }
    }

    /// Returns `true` once the response has been finalized.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        self.sent
    }

    /// Returns the status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status code.
    pub fn set_status(&mut self, status: StatusCode) -> ConduitResult<&mut Self> {
        self.ensure_unsent()?;
        self.status = status;
        Ok(self)
    }

    /// Returns the custom reason phrase, if set.
    #[must_use]
    pub fn status_message(&self) -> Option<&str> {
        self.status_message
            .as_ref()
            .and_then(|phrase| std::str::from_utf8(phrase.as_bytes()).ok())
    }

    /// Sets a custom reason phrase for the HTTP/1 status line.
    ///
    /// HTTP/2 has no reason phrase; it is dropped there.
    ///
    /// # Errors
    ///
    /// [`ConduitError::InvalidHeader`] if the phrase contains control
    /// characters, or [`ConduitError::ResponseAlreadySent`].
    pub fn set_status_message(&mut self, message: impl Into<String>) -> ConduitResult<&mut Self> {
        self.ensure_unsent()?;
        let phrase = ReasonPhrase::try_from(message.into())
            .map_err(|e| ConduitError::InvalidHeader(format!("reason phrase: {e}")))?;
        self.status_message = Some(phrase);
        Ok(self)
    }

    /// Returns the headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&mut self, name: &str, value: &str) -> ConduitResult<&mut Self> {
        self.ensure_unsent()?;
        let (name, value) = encode_header(name, value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Removes every value of a header.
    pub fn remove_header(&mut self, name: &str) -> ConduitResult<&mut Self> {
        self.ensure_unsent()?;
        self.headers.remove(name);
        Ok(self)
    }

    /// Adds a header value without removing existing ones.
    pub fn append_header(&mut self, name: &str, value: &str) -> ConduitResult<&mut Self> {
        self.ensure_unsent()?;
        let (name, value) = encode_header(name, value)?;
        self.headers.append(name, value);
        Ok(self)
    }

    /// Serializes `value` as JSON and finalizes the response.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> ConduitResult<()> {
        self.ensure_unsent()?;
        let body = serde_json::to_vec(value)?;
        self.finish(Some("application/json"), Bytes::from(body))
    }

    /// Finalizes the response with a plain-text body.
    pub fn text(&mut self, body: impl Into<String>) -> ConduitResult<()> {
        self.finish(Some("text/plain; charset=utf-8"), Bytes::from(body.into()))
    }

    /// Finalizes the response with raw bytes and an explicit content type.
    pub fn send(&mut self, content_type: &str, body: impl Into<Bytes>) -> ConduitResult<()> {
        self.ensure_unsent()?;
        HeaderValue::from_str(content_type)
            .map_err(|e| ConduitError::InvalidHeader(format!("content-type: {e}")))?;
        self.finish(Some(content_type), body.into())
    }

    /// Finalizes the response without a body.
    pub fn end(&mut self) -> ConduitResult<()> {
        self.finish(None, Bytes::new())
    }

    /// Returns the body written so far.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Converts into an `http::Response` for the wire.
    ///
    /// An unsent response is emitted with its current status and headers and
    /// an empty body. A custom reason phrase travels as a response extension,
    /// which hyper's HTTP/1 writer puts on the status line.
    #[must_use]
    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Some(phrase) = self.status_message {
            response.extensions_mut().insert(phrase);
        }
        response
    }

    fn finish(&mut self, content_type: Option<&str>, body: Bytes) -> ConduitResult<()> {
        self.ensure_unsent()?;
        if let Some(content_type) = content_type {
            if !self.headers.contains_key(header::CONTENT_TYPE) {
                let value = HeaderValue::from_str(content_type)
                    .map_err(|e| ConduitError::InvalidHeader(format!("content-type: {e}")))?;
                self.headers.insert(header::CONTENT_TYPE, value);
            }
        }
        self.headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        self.body = body;
        self.sent = true;
        Ok(())
    }

    fn ensure_unsent(&self) -> ConduitResult<()> {
        if self.sent {
            return Err(ConduitError::ResponseAlreadySent);
        }
        Ok(())
    }
}

fn encode_header(name: &str, value: &str) -> ConduitResult<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ConduitError::InvalidHeader(format!("{name}: {e}")))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|e| ConduitError::InvalidHeader(format!("{name}: {e}")))?;
    Ok((header_name, header_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_sets_headers() {
        let mut res = Response::new();
        res.json(&json!({ "message": "ok" })).unwrap();

        assert!(res.is_sent());
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(res.header("content-length"), Some("16"));
        assert_eq!(res.body().as_ref(), br#"{"message":"ok"}"#);
    }

    #[test]
    fn test_second_send_is_rejected() {
        let mut res = Response::new();
        res.text("first").unwrap();

        assert!(matches!(
            res.text("second"),
            Err(ConduitError::ResponseAlreadySent)
        ));
        assert!(res.set_status(StatusCode::IM_A_TEAPOT).is_err());
        assert!(res.set_header("x-late", "1").is_err());
        assert_eq!(res.body().as_ref(), b"first");
    }

    #[test]
    fn test_explicit_content_type_is_kept() {
        let mut res = Response::new();
        res.set_header("content-type", "application/problem+json")
            .unwrap();
        res.json(&json!({})).unwrap();
        assert_eq!(res.header("content-type"), Some("application/problem+json"));
    }

    #[test]
    fn test_invalid_header_name() {
        let mut res = Response::new();
        assert!(matches!(
            res.set_header("bad header", "x"),
            Err(ConduitError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_append_header() {
        let mut res = Response::new();
        res.append_header("vary", "Origin").unwrap();
        res.append_header("vary", "Accept").unwrap();
        assert_eq!(res.headers().get_all("vary").iter().count(), 2);
    }

    #[test]
    fn test_remove_header() {
        let mut res = Response::new();
        res.set_header("content-type", "text/html").unwrap();
        res.remove_header("content-type").unwrap();
        res.json(&json!({})).unwrap();
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert!(res.remove_header("content-type").is_err());
    }

    #[test]
    fn test_status_message_reaches_http_response() {
        let mut res = Response::new();
        res.set_status(StatusCode::IM_A_TEAPOT)
            .unwrap()
            .set_status_message("Short And Stout")
            .unwrap();
        res.end().unwrap();
        assert_eq!(res.status_message(), Some("Short And Stout"));

        let http = res.into_http();
        let phrase = http.extensions().get::<ReasonPhrase>().unwrap();
        assert_eq!(phrase.as_bytes(), b"Short And Stout");
    }

    #[test]
    fn test_status_message_rejects_control_characters() {
        let mut res = Response::new();
        assert!(matches!(
            res.set_status_message("split\r\nx-injected: 1"),
            Err(ConduitError::InvalidHeader(_))
        ));
        assert!(res.into_http().extensions().get::<ReasonPhrase>().is_none());
    }

    #[test]
    fn test_into_http_unsent() {
        let mut res = Response::new();
        res.set_status(StatusCode::NO_CONTENT).unwrap();
        let http = res.into_http();
        assert_eq!(http.status(), StatusCode::NO_CONTENT);
    }
}

//! Test error types.

use thiserror::Error;

/// Errors raised while building or sending a test request.
#[derive(Debug, Error)]
pub enum TestError {
    /// The request could not be built.
    #[error("Request build error: {0}")]
    RequestBuild(String),

    /// A header name or value was rejected.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The response body could not be read.
    #[error("Body read error: {0}")]
    BodyRead(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The dispatcher could not be created.
    #[error("Dispatcher error: {0}")]
    Dispatcher(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            TestError::InvalidHeader("x y".into()).to_string(),
            "Invalid header: x y"
        );
        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(TestError::from(json).to_string().starts_with("JSON error"));
    }
}

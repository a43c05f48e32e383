//! Structured logging for Conduit.
//!
//! [`init_logging`] installs a `tracing-subscriber` registry with an
//! [`EnvFilter`] and a JSON or human-readable fmt layer. [`log_request`]
//! emits the per-request access log event under the `conduit::request`
//! target.
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(route = "/user/{id}", "route loaded");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Target used for access log events.
pub const REQUEST_TARGET: &str = "conduit::request";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Filter directive used when `RUST_LOG` is unset (e.g. `"info"`).
    pub level: String,

    /// Whether to output JSON format.
    pub json_format: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: false,
            file_line_info: false,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Human-readable output at `debug`.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            file_line_info: true,
            ..Self::default()
        }
    }

    /// JSON output at `info`.
    #[must_use]
    pub fn production() -> Self {
        Self {
            json_format: true,
            ..Self::default()
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the level directive is invalid
/// or a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => create_env_filter(&config.level)?,
    };

    if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    Ok(())
}

/// Creates an env filter from a directive string.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter).map_err(|e| TelemetryError::LoggingInit(format!("Invalid log level: {e}")))
}

/// One handled request, as recorded in the access log.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLog<'a> {
    /// Peer address, or `-` when unknown.
    pub ip: &'a str,
    /// Method as received.
    pub method: &'a str,
    /// Raw request target, query included.
    pub url: &'a str,
    /// Final status code.
    pub status: u16,
    /// `User-Agent` header, or `-`.
    pub user_agent: &'a str,
    /// Request headers; only logged in verbose mode.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub headers: Value,
    /// Parsed request body; only logged in verbose mode.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub body: Value,
}

impl RequestLog<'_> {
    /// Formats the access log line `{ip} - {method} {url} {status} - {user-agent}`.
    ///
    /// ```
    /// use conduit_telemetry::logging::RequestLog;
    ///
    /// let log = RequestLog {
    ///     ip: "127.0.0.1",
    ///     method: "GET",
    ///     url: "/user/42?x=1",
    ///     status: 200,
    ///     user_agent: "curl/8.5.0",
    ///     headers: serde_json::Value::Null,
    ///     body: serde_json::Value::Null,
    /// };
    /// assert_eq!(log.line(), "127.0.0.1 - GET /user/42?x=1 200 - curl/8.5.0");
    /// ```
    pub fn line(&self) -> String {
        format!(
            "{} - {} {} {} - {}",
            self.ip, self.method, self.url, self.status, self.user_agent
        )
    }
}

/// Emits the access log event.
///
/// In verbose mode the whole record, headers and body included, is attached
/// as a JSON field; otherwise only the formatted line is logged.
pub fn log_request(log: &RequestLog<'_>, verbose: bool) {
    if verbose {
        let record = serde_json::to_string(log).unwrap_or_default();
        tracing::info!(target: REQUEST_TARGET, request = %record, "new http request");
    } else {
        tracing::info!(target: REQUEST_TARGET, "{}", log.line());
    }
}

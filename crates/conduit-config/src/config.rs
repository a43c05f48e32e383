//! The root configuration type.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, CorsSettings, LoggerSettings, MetricsSettings, ResponseMessages, ServerSettings};

/// Complete Conduit configuration.
///
/// # Example
///
/// ```
/// use conduit_config::ConduitConfig;
///
/// let config = ConduitConfig::default();
/// assert_eq!(config.middleware_timeout_ms, 10_000);
/// assert!(!config.dependency_cache);
/// assert_eq!(config.response_messages.not_found, "Not found");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConduitConfig {
    /// Enables debug behaviour such as verbose error logging.
    #[serde(default)]
    pub debug: bool,

    /// Free-form environment name.
    #[serde(default = "default_project_env")]
    pub project_env: String,

    /// Default per-attempt middleware timeout.
    #[serde(default = "default_middleware_timeout")]
    pub middleware_timeout_ms: u64,

    /// Resolve each route's dependencies once and reuse them.
    #[serde(default)]
    pub dependency_cache: bool,

    /// Bodies of framework error responses.
    #[serde(default)]
    pub response_messages: ResponseMessages,

    /// Request logging.
    #[serde(default)]
    pub logger: LoggerSettings,

    /// CORS stage.
    #[serde(default)]
    pub cors: CorsSettings,

    /// HTTP listener.
    #[serde(default)]
    pub server: ServerSettings,

    /// Prometheus exporter.
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl Default for ConduitConfig {
    fn default() -> Self {
        Self {
            debug: false,
            project_env: default_project_env(),
            middleware_timeout_ms: default_middleware_timeout(),
            dependency_cache: false,
            response_messages: ResponseMessages::default(),
            logger: LoggerSettings::default(),
            cors: CorsSettings::default(),
            server: ServerSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

fn default_project_env() -> String {
    "development".to_string()
}

fn default_middleware_timeout() -> u64 {
    10_000
}

impl ConduitConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if:
    /// - `middleware_timeout_ms` is zero
    /// - `cors.options_success_status` is not a valid status code
    /// - `server.host` is empty
    /// - metrics are enabled with an unparseable address
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.middleware_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "middleware_timeout_ms",
                "must be greater than zero",
            ));
        }

        if !(100..=599).contains(&self.cors.options_success_status) {
            return Err(ConfigError::invalid_value(
                "cors.options_success_status",
                format!("not an HTTP status: {}", self.cors.options_success_status),
            ));
        }

        if self.server.host.trim().is_empty() {
            return Err(ConfigError::invalid_value("server.host", "must not be empty"));
        }

        if self.metrics.enabled && self.metrics.addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "metrics.addr",
                format!("invalid socket address: {}", self.metrics.addr),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ConduitConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ConduitConfig {
            middleware_timeout_ms: 0,
            ..ConduitConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("middleware_timeout_ms"));
    }

    #[test]
    fn test_bad_status_rejected() {
        let mut config = ConduitConfig::default();
        config.cors.options_success_status = 42;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metrics_addr_checked_only_when_enabled() {
        let mut config = ConduitConfig::default();
        config.metrics.addr = "nowhere".to_string();
        assert!(config.validate().is_ok());
        config.metrics.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<ConduitConfig, _> = toml::from_str("middleware_timeout = 5");
        assert!(result.is_err());
    }
}

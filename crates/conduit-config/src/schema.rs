//! Configuration section types.

use serde::{Deserialize, Serialize};

/// Bodies of the framework's own error responses.
///
/// `not_found` may contain `{path}` and `method_not_allowed` may contain
/// `{method}`; see [`ResponseMessages::render`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ResponseMessages {
    /// Message for 404 responses.
    #[serde(default = "default_not_found")]
    pub not_found: String,

    /// Message for 500 responses.
    #[serde(default = "default_server_error")]
    pub server_error: String,

    /// Message for 405 responses.
    #[serde(default = "default_method_not_allowed")]
    pub method_not_allowed: String,
}

impl ResponseMessages {
    /// Replaces every `{placeholder}` in `template` with `value`.
    ///
    /// ```
    /// use conduit_config::ResponseMessages;
    ///
    /// let text = ResponseMessages::render("Method {method} not allowed", "method", "TRACE");
    /// assert_eq!(text, "Method TRACE not allowed");
    /// ```
    pub fn render(template: &str, placeholder: &str, value: &str) -> String {
        template.replace(&format!("{{{placeholder}}}"), value)
    }

    /// Renders the 404 message for `path`.
    pub fn not_found_for(&self, path: &str) -> String {
        Self::render(&self.not_found, "path", path)
    }

    /// Renders the 405 message for `method`.
    pub fn method_not_allowed_for(&self, method: &str) -> String {
        Self::render(&self.method_not_allowed, "method", method)
    }
}

impl Default for ResponseMessages {
    fn default() -> Self {
        Self {
            not_found: default_not_found(),
            server_error: default_server_error(),
            method_not_allowed: default_method_not_allowed(),
        }
    }
}

fn default_not_found() -> String {
    "Not found".to_string()
}

fn default_server_error() -> String {
    "Internal server error".to_string()
}

fn default_method_not_allowed() -> String {
    "Method {method} not allowed".to_string()
}

/// Request logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggerSettings {
    /// Emit one log event per handled request.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log headers, params, query and body instead of the one-line summary.
    #[serde(default)]
    pub verbose: bool,

    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    /// Emit JSON instead of human-readable lines.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            verbose: false,
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// One entry of an origin allow-list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OriginEntry {
    /// Exact origin.
    Exact(String),
    /// Regular expression, written as `{ regex = "..." }`.
    Pattern {
        /// The expression.
        regex: String,
    },
}

/// Origin policy as written in configuration.
///
/// | Form | Meaning |
/// |---|---|
/// | `"*"` or `true` | any origin |
/// | `false` | CORS disabled |
/// | `"https://a.example"` | fixed origin |
/// | `["https://a.example", { regex = "\\.example$" }]` | reflect matching origins |
/// | `{ regex = "\\.example$" }` | reflect matching origins |
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OriginSetting {
    /// `true` for any origin, `false` to disable.
    Toggle(bool),
    /// `"*"` or a fixed origin.
    Exact(String),
    /// Allow-list.
    List(Vec<OriginEntry>),
    /// Single regular expression.
    Pattern {
        /// The expression.
        regex: String,
    },
}

impl Default for OriginSetting {
    fn default() -> Self {
        Self::Exact("*".to_string())
    }
}

/// CORS stage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CorsSettings {
    /// Allowed origins.
    #[serde(default)]
    pub origin: OriginSetting,

    /// Methods advertised on preflight.
    #[serde(default = "default_cors_methods")]
    pub methods: Vec<String>,

    /// Headers advertised on preflight. Empty reflects the request's
    /// `Access-Control-Request-Headers`.
    #[serde(default)]
    pub allowed_headers: Vec<String>,

    /// Headers exposed to the client.
    #[serde(default)]
    pub exposed_headers: Vec<String>,

    /// Send `Access-Control-Allow-Credentials: true`.
    #[serde(default)]
    pub credentials: bool,

    /// Preflight cache lifetime.
    #[serde(default)]
    pub max_age_secs: Option<u64>,

    /// Pass preflight requests on to the route instead of answering them.
    #[serde(default)]
    pub preflight_continue: bool,

    /// Status for answered preflight requests.
    #[serde(default = "default_options_status")]
    pub options_success_status: u16,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            origin: OriginSetting::default(),
            methods: default_cors_methods(),
            allowed_headers: Vec::new(),
            exposed_headers: Vec::new(),
            credentials: false,
            max_age_secs: None,
            preflight_continue: false,
            options_success_status: default_options_status(),
        }
    }
}

fn default_cors_methods() -> Vec<String> {
    ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_options_status() -> u16 {
    204
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds to wait for in-flight connections on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl ServerSettings {
    /// Returns `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    /// Install the exporter at startup.
    #[serde(default)]
    pub enabled: bool,

    /// Exporter listen address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_replaces_every_placeholder() {
        assert_eq!(
            ResponseMessages::render("{path} missing ({path})", "path", "/x"),
            "/x missing (/x)"
        );
        assert_eq!(ResponseMessages::render("Not found", "path", "/x"), "Not found");
    }

    #[test]
    fn test_messages_defaults() {
        let messages = ResponseMessages::default();
        assert_eq!(messages.not_found_for("/a"), "Not found");
        assert_eq!(messages.method_not_allowed_for("TRACE"), "Method TRACE not allowed");
    }

    #[test]
    fn test_origin_forms() {
        #[derive(Deserialize)]
        struct Wrapper {
            origin: OriginSetting,
        }

        let parse = |s: &str| toml::from_str::<Wrapper>(s).unwrap().origin;

        assert_eq!(parse(r#"origin = "*""#), OriginSetting::Exact("*".into()));
        assert_eq!(parse("origin = false"), OriginSetting::Toggle(false));
        assert_eq!(
            parse(r#"origin = { regex = "example\\.com$" }"#),
            OriginSetting::Pattern {
                regex: r"example\.com$".into()
            }
        );
        assert_eq!(
            parse(r#"origin = ["https://a.test", { regex = "b\\.test$" }]"#),
            OriginSetting::List(vec![
                OriginEntry::Exact("https://a.test".into()),
                OriginEntry::Pattern {
                    regex: r"b\.test$".into()
                },
            ])
        );
    }

    #[test]
    fn test_server_addr() {
        assert_eq!(ServerSettings::default().addr(), "127.0.0.1:8000");
    }
}

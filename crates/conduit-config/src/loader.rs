//! Layered configuration loading.
//!
//! Layers are applied in order, later ones overriding earlier ones:
//! 1. Built-in defaults
//! 2. A TOML or JSON file
//! 3. Environment variables

use std::env;
use std::fs;
use std::path::Path;

use crate::{ConduitConfig, ConfigError, OriginEntry, OriginSetting};

/// Default environment prefix.
pub const DEFAULT_ENV_PREFIX: &str = "CONDUIT";

/// Configuration loader.
///
/// Environment variables are named `PREFIX_KEY` for top-level keys and
/// `PREFIX_SECTION__KEY` for nested ones, e.g. `CONDUIT_MIDDLEWARE_TIMEOUT_MS`
/// or `CONDUIT_SERVER__PORT`.
///
/// # Example
///
/// ```no_run
/// use conduit_config::ConfigLoader;
///
/// # fn main() -> Result<(), conduit_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_dotenv()
///     .with_optional_file("conduit.toml")?
///     .with_env_prefix("CONDUIT")
///     .load()?;
///
/// println!("listening on {}", config.server.addr());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: ConduitConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Creates a loader starting from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a file. The format is chosen by extension (`.toml` or `.json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed or
    /// contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if !matches!(format.as_str(), "toml" | "json") {
            return Err(ConfigError::UnsupportedFormat(path.display().to_string()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::unreadable(path, e))?;
        self.config = parse(&content, &format)?;
        Ok(self)
    }

    /// Loads a file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration from a string in `format` (`"toml"` or `"json"`).
    ///
    /// ```
    /// use conduit_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("middleware_timeout_ms = 250", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.middleware_timeout_ms, 250);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Enables environment overrides under `prefix`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(format!("{}_", prefix.trim_end_matches('_').to_uppercase()));
        self
    }

    /// Reads a `.env` file into the process environment, if one exists.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        // A missing file is not an error.
        let _ = dotenvy::dotenv();
        self
    }

    /// Applies overrides from an explicit set of variables instead of the
    /// process environment. Names must carry the configured prefix.
    pub fn with_vars<I, K, V>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let prefix = self
            .env_prefix
            .clone()
            .unwrap_or_else(|| format!("{DEFAULT_ENV_PREFIX}_"));
        for (key, value) in vars {
            if let Some(stripped) = key.as_ref().strip_prefix(&prefix) {
                self.apply_env_var(key.as_ref(), stripped, value.as_ref())?;
            }
        }
        Ok(self)
    }

    /// Applies environment overrides (if a prefix was set) and validates.
    pub fn load(mut self) -> Result<ConduitConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.clone() {
            let vars: Vec<(String, String)> = env::vars().filter(|(k, _)| k.starts_with(&prefix)).collect();
            self = self.with_vars(vars)?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without applying the environment or validating.
    #[must_use]
    pub fn load_unvalidated(self) -> ConduitConfig {
        self.config
    }

    fn apply_env_var(&mut self, var: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        let parts: Vec<&str> = key.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["DEBUG"] => config.debug = parse_bool(var, value)?,
            ["PROJECT_ENV"] => config.project_env = value.to_string(),
            ["MIDDLEWARE_TIMEOUT_MS"] => config.middleware_timeout_ms = parse_num(var, value)?,
            ["DEPENDENCY_CACHE"] => config.dependency_cache = parse_bool(var, value)?,

            ["RESPONSE_MESSAGES", "NOT_FOUND"] => config.response_messages.not_found = value.to_string(),
            ["RESPONSE_MESSAGES", "SERVER_ERROR"] => {
                config.response_messages.server_error = value.to_string();
            }
            ["RESPONSE_MESSAGES", "METHOD_NOT_ALLOWED"] => {
                config.response_messages.method_not_allowed = value.to_string();
            }

            ["LOGGER", "ENABLED"] => config.logger.enabled = parse_bool(var, value)?,
            ["LOGGER", "VERBOSE"] => config.logger.verbose = parse_bool(var, value)?,
            ["LOGGER", "LEVEL"] => config.logger.level = value.to_string(),
            ["LOGGER", "JSON"] => config.logger.json = parse_bool(var, value)?,

            ["CORS", "ORIGIN"] => config.cors.origin = parse_origin(value),
            ["CORS", "METHODS"] => config.cors.methods = parse_list(value),
            ["CORS", "ALLOWED_HEADERS"] => config.cors.allowed_headers = parse_list(value),
            ["CORS", "EXPOSED_HEADERS"] => config.cors.exposed_headers = parse_list(value),
            ["CORS", "CREDENTIALS"] => config.cors.credentials = parse_bool(var, value)?,
            ["CORS", "MAX_AGE_SECS"] => {
                config.cors.max_age_secs = if value.is_empty() {
                    None
                } else {
                    Some(parse_num(var, value)?)
                };
            }
            ["CORS", "PREFLIGHT_CONTINUE"] => config.cors.preflight_continue = parse_bool(var, value)?,
            ["CORS", "OPTIONS_SUCCESS_STATUS"] => {
                config.cors.options_success_status = parse_num(var, value)?;
            }

            ["SERVER", "HOST"] => config.server.host = value.to_string(),
            ["SERVER", "PORT"] => config.server.port = parse_num(var, value)?,
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_num(var, value)?;
            }

            ["METRICS", "ENABLED"] => config.metrics.enabled = parse_bool(var, value)?,
            ["METRICS", "ADDR"] => config.metrics.addr = value.to_string(),

            // Unrelated variables that happen to share the prefix.
            _ => {}
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<ConduitConfig, ConfigError> {
    match format {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_var(var, "expected boolean")),
    }
}

fn parse_num<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_var(var, "expected integer"))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// `*`, `true` and `false` keep their meaning; a comma-separated value
/// becomes an allow-list; anything else is a fixed origin.
fn parse_origin(value: &str) -> OriginSetting {
    match value.trim() {
        "true" => OriginSetting::Toggle(true),
        "false" => OriginSetting::Toggle(false),
        single if !single.contains(',') => OriginSetting::Exact(single.to_string()),
        list => OriginSetting::List(parse_list(list).into_iter().map(OriginEntry::Exact).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_defaults() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, ConduitConfig::default());
    }

    #[test]
    fn test_loader_with_string_toml() {
        let toml = r#"
            dependency_cache = true

            [response_messages]
            not_found = "Nothing at {path}"

            [server]
            port = 9000
        "#;

        let config = ConfigLoader::new().with_string(toml, "toml").unwrap().load().unwrap();

        assert!(config.dependency_cache);
        assert_eq!(config.response_messages.not_found_for("/x"), "Nothing at /x");
        assert_eq!(config.response_messages.server_error, "Internal server error");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"logger": {"verbose": true}, "cors": {"origin": ["https://a.test"]}}"#;

        let config = ConfigLoader::new().with_string(json, "json").unwrap().load().unwrap();

        assert!(config.logger.verbose);
        assert_eq!(
            config.cors.origin,
            OriginSetting::List(vec![OriginEntry::Exact("https://a.test".into())])
        );
    }

    #[test]
    fn test_loader_unsupported_format() {
        let err = ConfigLoader::new().with_string("", "yaml").unwrap_err();
        assert_eq!(err.to_string(), "unsupported configuration format: yaml");
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "middleware_timeout_ms = 50").unwrap();
        writeln!(file, "[logger]").unwrap();
        writeln!(file, "json = true").unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.middleware_timeout_ms, 50);
        assert!(config.logger.json);
    }

    #[test]
    fn test_loader_rejects_unknown_file_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = ConfigLoader::new().with_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_loader_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("conduit.toml");

        assert!(matches!(
            ConfigLoader::new().with_file(&missing),
            Err(ConfigError::FileNotFound { .. })
        ));

        let config = ConfigLoader::new().with_optional_file(&missing).unwrap().load().unwrap();
        assert_eq!(config.middleware_timeout_ms, 10_000);
    }

    #[test]
    fn test_loader_rejects_invalid_values() {
        let result = ConfigLoader::new()
            .with_string("middleware_timeout_ms = 0", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let config = ConfigLoader::new()
            .with_env_prefix("CONDUIT")
            .with_vars([
                ("CONDUIT_MIDDLEWARE_TIMEOUT_MS", "75"),
                ("CONDUIT_DEPENDENCY_CACHE", "yes"),
                ("CONDUIT_SERVER__PORT", "8081"),
                ("CONDUIT_RESPONSE_MESSAGES__NOT_FOUND", "Gone: {path}"),
                ("CONDUIT_CORS__ORIGIN", "https://a.test, https://b.test"),
                ("CONDUIT_CORS__MAX_AGE_SECS", "600"),
                ("CONDUIT_UNRELATED", "ignored"),
                ("OTHER_SERVER__PORT", "1"),
            ])
            .unwrap()
            .load_unvalidated();

        assert_eq!(config.middleware_timeout_ms, 75);
        assert!(config.dependency_cache);
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.response_messages.not_found, "Gone: {path}");
        assert_eq!(config.cors.max_age_secs, Some(600));
        assert_eq!(
            config.cors.origin,
            OriginSetting::List(vec![
                OriginEntry::Exact("https://a.test".into()),
                OriginEntry::Exact("https://b.test".into()),
            ])
        );
    }

    #[test]
    fn test_env_override_parse_errors() {
        let err = ConfigLoader::new()
            .with_vars([("CONDUIT_SERVER__PORT", "eighty")])
            .unwrap_err();
        assert!(err.to_string().contains("CONDUIT_SERVER__PORT"));

        let err = ConfigLoader::new()
            .with_vars([("CONDUIT_DEBUG", "maybe")])
            .unwrap_err();
        assert!(err.to_string().contains("expected boolean"));
    }

    #[test]
    fn test_origin_env_forms() {
        assert_eq!(parse_origin("*"), OriginSetting::Exact("*".into()));
        assert_eq!(parse_origin("false"), OriginSetting::Toggle(false));
        assert_eq!(
            parse_origin("https://a.test"),
            OriginSetting::Exact("https://a.test".into())
        );
    }
}

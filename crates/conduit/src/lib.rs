//! # Conduit
//!
//! **A minimal async HTTP framework**
//!
//! - Routes with `{name}(regex)` parameters, matched first-registered-wins
//! - Middleware pipelines with per-entry timeouts and a critical flag
//! - A dependency container with singleton, scoped and transient lifecycles
//! - JSON-schema request validation injected as route middleware
//! - Controllers whose actions are bound by name
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conduit::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().with_dotenv().load()?;
//!     conduit::init_telemetry(&config)?;
//!
//!     let dispatcher = Arc::new(Dispatcher::new(config)?);
//!     dispatcher.register_dependency_value("greeting", String::from("hello"));
//!
//!     let mut router = Router::new();
//!     router.get(
//!         "/hello/{name}",
//!         Endpoint::new(|req, res, deps| Box::pin(async move {
//!             let greeting = deps.require::<String>("greeting")?;
//!             res.text(format!("{greeting} {}", req.param("name").unwrap_or("?")))?;
//!             Ok(())
//!         }))
//!         .with_dependencies(["greeting"]),
//!     )?;
//!     dispatcher.load_router(&router)?;
//!
//!     Server::new(dispatcher).serve().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//! Request → method check → route lookup → query parse → dependency resolve
//!                                                              ↓
//! Response ← handler ← route middleware ← global middleware ← CORS
//! ```

#![doc(html_root_url = "https://docs.rs/conduit/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use conduit_config as config;
pub use conduit_core as core;
pub use conduit_middleware as middleware;
pub use conduit_router as router;
pub use conduit_server as server;
pub use conduit_telemetry as telemetry;

use conduit_config::{ConduitConfig, LoggerSettings, MetricsSettings};
use conduit_telemetry::{LogConfig, MetricsConfig, TelemetryResult};

/// Maps logger settings onto the subscriber configuration.
///
/// `enabled` on the settings only controls the per-request access log, so
/// the subscriber is always installed.
#[must_use]
pub fn log_config(settings: &LoggerSettings, debug: bool) -> LogConfig {
    LogConfig {
        enabled: true,
        level: settings.level.clone(),
        json_format: settings.json,
        file_line_info: debug,
        ..LogConfig::default()
    }
}

/// Maps metrics settings onto the exporter configuration.
#[must_use]
pub fn metrics_config(settings: &MetricsSettings) -> MetricsConfig {
    MetricsConfig {
        enabled: settings.enabled,
        addr: settings.addr.clone(),
        ..MetricsConfig::default()
    }
}

/// Installs logging and, when enabled, the metrics exporter.
///
/// Call once at startup from inside a Tokio runtime.
///
/// # Errors
///
/// Fails if a subscriber or recorder is already installed, or if the level
/// directive or exporter address is invalid.
pub fn init_telemetry(config: &ConduitConfig) -> TelemetryResult<()> {
    conduit_telemetry::init_logging(&log_config(&config.logger, config.debug))?;
    conduit_telemetry::init_metrics(&metrics_config(&config.metrics))
}

/// Common imports.
///
/// ```rust,ignore
/// use conduit::prelude::*;
/// ```
pub mod prelude {
    pub use conduit_config::{ConduitConfig, ConfigError, ConfigLoader};
    pub use conduit_core::{
        BoxFuture, ConduitError, ConduitResult, Controller, ControllerMethod, Dependencies, DependencyContainer,
        Endpoint, HttpMethod, Lifecycle, Request, Response,
    };
    pub use conduit_middleware::stages::{CorsBuilder, Validation};
    pub use conduit_middleware::{from_fn, Middleware, MiddlewareEntry, Next};
    pub use conduit_router::{Router, UnloadRoute};
    pub use conduit_server::{Dispatcher, Server, ShutdownSignal};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_follows_settings() {
        let settings = LoggerSettings {
            enabled: false,
            verbose: true,
            level: "debug".to_string(),
            json: true,
        };

        let config = log_config(&settings, true);

        assert!(config.enabled);
        assert_eq!(config.level, "debug");
        assert!(config.json_format);
        assert!(config.file_line_info);
    }

    #[test]
    fn test_metrics_config_keeps_buckets() {
        let settings = MetricsSettings {
            enabled: true,
            addr: "0.0.0.0:9100".to_string(),
        };

        let config = metrics_config(&settings);

        assert!(config.enabled);
        assert_eq!(config.addr, "0.0.0.0:9100");
        assert_eq!(config.duration_buckets, MetricsConfig::default().duration_buckets);
    }
}

//! Typed configuration for Conduit.
//!
//! [`ConduitConfig`] holds every setting the dispatcher, the CORS stage, the
//! request logger and the HTTP listener read. [`ConfigLoader`] builds one from
//! defaults, an optional file and `CONDUIT_*` environment variables. Unknown
//! fields are rejected.
//!
//! # Configuration File Format
//!
//! ```toml
//! debug = false
//! project_env = "production"
//! middleware_timeout_ms = 10000
//! dependency_cache = false
//!
//! [response_messages]
//! not_found = "Not found"
//! server_error = "Internal server error"
//! method_not_allowed = "Method {method} not allowed"
//!
//! [logger]
//! enabled = true
//! verbose = false
//! level = "info"
//! json = true
//!
//! [cors]
//! origin = ["https://app.example.com", { regex = "\\.example\\.com$" }]
//! credentials = true
//! max_age_secs = 600
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//!
//! [metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::ConduitConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{
    CorsSettings, LoggerSettings, MetricsSettings, OriginEntry, OriginSetting, ResponseMessages,
    ServerSettings,
};

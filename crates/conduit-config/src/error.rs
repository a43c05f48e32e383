//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Why a [`ConduitConfig`](crate::ConduitConfig) could not be produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// `with_file` was given a path that does not exist.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read configuration file {path}")]
    Unreadable {
        /// The file.
        path: PathBuf,
        /// The I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The extension or format name is neither `toml` nor `json`.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// Malformed TOML, or a TOML document with unknown fields.
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON, or a JSON document with unknown fields.
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A value parsed but failed [`ConduitConfig::validate`](crate::ConduitConfig::validate).
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Dotted name of the field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A `CONDUIT_*` override had the wrong shape.
    #[error("cannot apply {var}: {reason}")]
    EnvVar {
        /// The variable name, prefix included.
        var: String,
        /// What was expected.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }

    /// Builds an [`InvalidValue`](Self::InvalidValue) error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env_var(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvVar {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

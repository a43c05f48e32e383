//! Observability for Conduit.
//!
//! - [`logging`] - `tracing-subscriber` setup and the per-request access log
//! - [`metrics`] - Prometheus exporter and the standard request metrics
//!
//! Nothing here is required for the dispatcher to work: without an installed
//! subscriber or recorder, log events and metric updates are dropped.

#![doc(html_root_url = "https://docs.rs/conduit-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, log_request, LogConfig, RequestLog};
pub use crate::metrics::{init_metrics, record_request, render_metrics, InFlightGuard, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

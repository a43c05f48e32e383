//! Prometheus metrics for Conduit.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `conduit_requests_total` | Counter | `method`, `status` | Handled requests |
//! | `conduit_request_duration_seconds` | Histogram | `method` | Request latency |
//! | `conduit_in_flight_requests` | Gauge | - | Requests being handled |
//! | `conduit_middleware_timeouts_total` | Counter | `middleware` | Timed-out middleware attempts |
//! | `conduit_validation_failures_total` | Counter | `target` | Rejected payloads |
//!
//! Recording is a no-op until a recorder is installed.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

/// Metric names.
pub mod names {
    /// Handled requests.
    pub const REQUESTS_TOTAL: &str = "conduit_requests_total";
    /// Request latency.
    pub const REQUEST_DURATION: &str = "conduit_request_duration_seconds";
    /// Requests being handled.
    pub const IN_FLIGHT: &str = "conduit_in_flight_requests";
    /// Timed-out middleware attempts.
    pub const MIDDLEWARE_TIMEOUTS: &str = "conduit_middleware_timeouts_total";
    /// Rejected payloads.
    pub const VALIDATION_FAILURES: &str = "conduit_validation_failures_total";
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Address to expose metrics on (e.g., "0.0.0.0:9090").
    pub addr: String,

    /// Histogram buckets for request duration.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "127.0.0.1:9090".to_string(),
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Installs the Prometheus recorder and spawns its HTTP listener.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the address is invalid, no runtime is available, or a
/// recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(names::REQUEST_DURATION.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    let _ = METRICS_HANDLE.set(handle);

    runtime.spawn(async move {
        if let Err(err) = exporter.await {
            tracing::error!(error = ?err, "metrics exporter stopped");
        }
    });

    describe_metrics();
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}

/// Renders metrics in Prometheus text format, if a recorder is installed.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_metrics() {
    describe_counter!(names::REQUESTS_TOTAL, "Total number of HTTP requests handled");
    describe_histogram!(names::REQUEST_DURATION, "HTTP request duration in seconds");
    describe_gauge!(names::IN_FLIGHT, "Number of HTTP requests currently being handled");
    describe_counter!(
        names::MIDDLEWARE_TIMEOUTS,
        "Middleware attempts that neither advanced nor responded in time"
    );
    describe_counter!(names::VALIDATION_FAILURES, "Requests rejected by a validator");
}

/// Records a handled request.
pub fn record_request(method: &str, status_code: u16, duration: Duration) {
    counter!(
        names::REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(names::REQUEST_DURATION, "method" => method.to_string()).record(duration.as_secs_f64());
}

/// Decrements the in-flight gauge when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    _private: (),
}

impl InFlightGuard {
    /// Increments the in-flight gauge.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::IN_FLIGHT).increment(1.0);
        Self { _private: () }
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(names::IN_FLIGHT).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.duration_buckets.len(), 12);
    }

    #[test]
    fn test_disabled_is_noop() {
        assert!(init_metrics(&MetricsConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_address() {
        let config = MetricsConfig {
            enabled: true,
            addr: "not-an-address".to_string(),
            ..MetricsConfig::default()
        };
        assert!(matches!(init_metrics(&config), Err(TelemetryError::InvalidAddress(_))));
    }

    #[test]
    fn test_requires_runtime() {
        let config = MetricsConfig {
            enabled: true,
            ..MetricsConfig::default()
        };
        assert!(matches!(init_metrics(&config), Err(TelemetryError::MetricsInit(_))));
    }

    #[tokio::test]
    async fn test_enabled_installs_recorder_and_exporter() {
        let config = MetricsConfig {
            enabled: true,
            addr: "127.0.0.1:0".to_string(),
            ..MetricsConfig::default()
        };
        init_metrics(&config).expect("recorder installs inside a runtime");

        record_request("GET", 200, Duration::from_millis(3));
        let rendered = render_metrics().expect("handle is stored");
        assert!(rendered.contains(names::REQUESTS_TOTAL));
    }

    #[test]
    fn test_record_functions_dont_panic() {
        record_request("GET", 200, Duration::from_millis(10));
        let guard = InFlightGuard::new();
        drop(guard);
    }
}

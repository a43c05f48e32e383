//! Middleware entries: a middleware plus its timeout and failure policy.

use crate::middleware::Middleware;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A middleware as registered in a pipeline layer.
///
/// An entry without an explicit timeout uses the pipeline default. A
/// `critical` entry aborts the request when it fails; a non-critical one is
/// logged and skipped.
///
/// ```
/// use conduit_middleware::{from_fn, MiddlewareEntry};
/// use std::time::Duration;
///
/// let entry = MiddlewareEntry::new(from_fn(|_req, _res, next| {
///     Box::pin(async move {
///         next.advance();
///         Ok(())
///     })
/// }))
/// .timeout_ms(250)
/// .critical(true);
///
/// assert_eq!(entry.timeout(), Some(Duration::from_millis(250)));
/// assert!(entry.is_critical());
/// ```
#[derive(Clone)]
pub struct MiddlewareEntry {
    middleware: Arc<dyn Middleware>,
    timeout: Option<Duration>,
    critical: bool,
}

impl MiddlewareEntry {
    /// Wraps a middleware with the default policy: pipeline timeout, non-critical.
    pub fn new<M: Middleware>(middleware: M) -> Self {
        Self::from_arc(Arc::new(middleware))
    }

    /// Wraps a shared middleware.
    #[must_use]
    pub fn from_arc(middleware: Arc<dyn Middleware>) -> Self {
        Self {
            middleware,
            timeout: None,
            critical: false,
        }
    }

    /// Sets an explicit timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the timeout in milliseconds; `0` falls back to the pipeline default.
    #[must_use]
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = if timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(timeout_ms))
        };
        self
    }

    /// Marks the entry as critical.
    #[must_use]
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Returns the middleware's name.
    pub fn name(&self) -> &'static str {
        self.middleware.name()
    }

    /// Returns the explicit timeout, if any.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns `true` if a failure aborts the request.
    pub const fn is_critical(&self) -> bool {
        self.critical
    }

    pub(crate) fn middleware(&self) -> &dyn Middleware {
        self.middleware.as_ref()
    }
}

impl fmt::Debug for MiddlewareEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareEntry")
            .field("name", &self.name())
            .field("timeout", &self.timeout)
            .field("critical", &self.critical)
            .finish()
    }
}

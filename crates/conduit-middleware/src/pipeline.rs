//! The pipeline runner.
//!
//! A request passes through an ordered list of [`Layer`]s (CORS, global,
//! route) and then reaches the handler. Every entry is raced against its
//! deadline:
//!
//! ```text
//!   entry ──advance()──────────────▶ next entry
//!     │ ──sends response───────────▶ stop (Halted)
//!     │ ──error / panic / timeout──▶ critical?  yes ─▶ stop (Failed)
//!     │                                          no  ─▶ warn, next entry
//!     └ ──returns, no advance──────▶ wait for advance until the deadline
//! ```
//!
//! When the deadline fires first the middleware future is dropped, so it is
//! cancelled at its next suspension point.

use crate::entry::MiddlewareEntry;
use crate::middleware::Next;
use conduit_core::{ConduitError, ConduitResult, Dependencies, HandlerFn, Request, Response};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

/// Timeout applied to entries that do not set their own.
pub const DEFAULT_MIDDLEWARE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// A named group of entries run in order.
#[derive(Debug, Clone, Copy)]
pub struct Layer<'e> {
    name: &'static str,
    entries: &'e [MiddlewareEntry],
}

impl<'e> Layer<'e> {
    /// Creates a layer over a slice of entries.
    #[must_use]
    pub const fn new(name: &'static str, entries: &'e [MiddlewareEntry]) -> Self {
        Self { name, entries }
    }

    /// Returns the layer name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the entries.
    pub const fn entries(&self) -> &'e [MiddlewareEntry] {
        self.entries
    }
}

/// How a pipeline run ended.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Every entry passed and the handler returned successfully.
    Completed,
    /// A middleware finalized the response; nothing after it ran.
    Halted,
    /// A critical entry or the handler failed.
    Failed(ConduitError),
}

impl PipelineOutcome {
    /// Returns `true` for [`PipelineOutcome::Failed`].
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Runs middleware layers and the terminal handler for one request.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline {
    default_timeout: Duration,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(DEFAULT_MIDDLEWARE_TIMEOUT)
    }
}

impl Pipeline {
    /// Creates a runner with the given default entry timeout.
    #[must_use]
    pub const fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    /// Returns the default entry timeout.
    pub const fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Runs `layers` in order, then `handler` if no entry finalized the response.
    pub async fn run(
        &self,
        layers: &[Layer<'_>],
        req: &mut Request,
        res: &mut Response,
        handler: &HandlerFn,
        deps: Dependencies,
    ) -> PipelineOutcome {
        for layer in layers {
            for entry in layer.entries {
                if res.is_sent() {
                    return PipelineOutcome::Halted;
                }

                let Err(err) = self.run_entry(entry, req, res).await else {
                    continue;
                };

                if entry.is_critical() {
                    tracing::error!(
                        layer = layer.name,
                        middleware = entry.name(),
                        error = %err,
                        "critical middleware failed, aborting request"
                    );
                    return PipelineOutcome::Failed(err);
                }
                tracing::warn!(
                    layer = layer.name,
                    middleware = entry.name(),
                    error = %err,
                    "middleware failed, continuing"
                );
            }
        }

        if res.is_sent() {
            return PipelineOutcome::Halted;
        }

        match AssertUnwindSafe(handler(req, res, deps)).catch_unwind().await {
            Ok(Ok(())) => PipelineOutcome::Completed,
            Ok(Err(err)) => PipelineOutcome::Failed(ConduitError::Handler(err)),
            Err(panic) => PipelineOutcome::Failed(ConduitError::Handler(anyhow::anyhow!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    async fn run_entry(
        &self,
        entry: &MiddlewareEntry,
        req: &mut Request,
        res: &mut Response,
    ) -> ConduitResult<()> {
        let timeout = entry.timeout().unwrap_or(self.default_timeout);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let next = Next::new();

        let result = {
            let call = AssertUnwindSafe(entry.middleware().handle(req, res, next.clone())).catch_unwind();
            tokio::pin!(call);

            tokio::select! {
                biased;
                out = &mut call => out,
                // Advancing satisfies the entry; its tail gets whatever is left of the deadline.
                () = next.advanced() => tokio::select! {
                    biased;
                    out = &mut call => out,
                    () = &mut deadline => {
                        tracing::warn!(
                            middleware = entry.name(),
                            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                            "middleware advanced but did not return in time, dropping it"
                        );
                        Ok(Ok(()))
                    }
                },
                () = &mut deadline => return Err(timed_out(entry, timeout)),
            }
        };

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(ConduitError::Handler(err)),
            Err(panic) => {
                return Err(ConduitError::Handler(anyhow::anyhow!(
                    "middleware {} panicked: {}",
                    entry.name(),
                    panic_message(panic.as_ref())
                )))
            }
        }

        if next.is_advanced() || res.is_sent() {
            return Ok(());
        }

        // Returned without advancing: a spawned task may still advance before the deadline.
        tokio::select! {
            biased;
            () = next.advanced() => Ok(()),
            () = &mut deadline => Err(timed_out(entry, timeout)),
        }
    }
}

fn timed_out(entry: &MiddlewareEntry, timeout: Duration) -> ConduitError {
    metrics::counter!("conduit_middleware_timeouts_total", "middleware" => entry.name()).increment(1);
    ConduitError::MiddlewareTimeout {
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! The middleware trait and the advance signal.
//!
//! A middleware receives the request, the response and a [`Next`] handle.
//! Calling [`Next::advance`] tells the pipeline to move on to the following
//! entry once this middleware's future completes. A middleware that instead
//! finalizes the response ends the pipeline early.
//!
//! # Example
//!
//! ```
//! use conduit_core::{BoxFuture, Request, Response};
//! use conduit_middleware::{Middleware, Next};
//!
//! struct PoweredBy;
//!
//! impl Middleware for PoweredBy {
//!     fn name(&self) -> &'static str {
//!         "powered-by"
//!     }
//!
//!     fn handle<'a>(
//!         &'a self,
//!         _req: &'a mut Request,
//!         res: &'a mut Response,
//!         next: Next,
//!     ) -> BoxFuture<'a, anyhow::Result<()>> {
//!         Box::pin(async move {
//!             res.set_header("x-powered-by", "conduit")?;
//!             next.advance();
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use conduit_core::{BoxFuture, Request, Response};
use std::any::type_name;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A single middleware stage.
///
/// # Contract
///
/// - Call [`Next::advance`] to let the pipeline continue, or finalize the
///   response to stop it.
/// - Returning an error fails the attempt. The entry's `critical` flag decides
///   whether that aborts the request.
/// - Returning `Ok(())` without doing either leaves the attempt pending until
///   its timeout elapses.
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }

    /// Processes the request.
    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        next: Next,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

struct Signal {
    advanced: AtomicBool,
    notify: Notify,
}

/// Handle a middleware uses to let the pipeline proceed.
///
/// `Next` is cheap to clone and may be moved into spawned tasks; advancing
/// from any clone counts. Advancing more than once has no further effect.
#[derive(Clone)]
pub struct Next {
    signal: Arc<Signal>,
}

impl Next {
    pub(crate) fn new() -> Self {
        Self {
            signal: Arc::new(Signal {
                advanced: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signals that the pipeline may proceed to the next entry.
    pub fn advance(&self) {
        if !self.signal.advanced.swap(true, Ordering::SeqCst) {
            // notify_one stores a permit, so a waiter that registers later still wakes.
            self.signal.notify.notify_one();
        }
    }

    /// Returns `true` once [`advance`](Self::advance) has been called.
    #[must_use]
    pub fn is_advanced(&self) -> bool {
        self.signal.advanced.load(Ordering::SeqCst)
    }

    /// Completes when the middleware has advanced.
    pub(crate) async fn advanced(&self) {
        if self.is_advanced() {
            return;
        }
        self.signal.notify.notified().await;
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("advanced", &self.is_advanced())
            .finish()
    }
}

/// A middleware built from a closure. See [`from_fn`].
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

/// Creates a middleware from a closure.
///
/// ```
/// use conduit_middleware::from_fn;
///
/// let mw = from_fn(|req, _res, next| {
///     Box::pin(async move {
///         tracing::debug!(path = req.pathname(), "passing through");
///         next.advance();
///         Ok(())
///     })
/// })
/// .named("trace-path");
/// # let _ = mw;
/// ```
pub fn from_fn<F>(func: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, Next) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
{
    FnMiddleware {
        name: "anonymous",
        func,
    }
}

impl<F> FnMiddleware<F> {
    /// Sets the name reported in logs.
    #[must_use]
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, Next) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        next: Next,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        (self.func)(req, res, next)
    }
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::HttpMethod;
    use std::time::Duration;

    struct Tagging;

    impl Middleware for Tagging {
        fn handle<'a>(
            &'a self,
            req: &'a mut Request,
            _res: &'a mut Response,
            next: Next,
        ) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async move {
                req.extensions_mut().insert("tagged");
                next.advance();
                Ok(())
            })
        }
    }

    #[test]
    fn test_default_name_is_type_name() {
        assert!(Tagging.name().ends_with("Tagging"));
    }

    #[tokio::test]
    async fn test_trait_middleware_advances() {
        let mut req = Request::new(HttpMethod::Get, "/");
        let mut res = Response::new();
        let next = Next::new();

        Tagging.handle(&mut req, &mut res, next.clone()).await.unwrap();
        assert!(next.is_advanced());
        assert_eq!(req.extensions().get::<&str>(), Some(&"tagged"));
    }

    #[tokio::test]
    async fn test_fn_middleware() {
        let mw = from_fn(|_req, res, _next| {
            Box::pin(async move {
                res.text("stopped")?;
                Ok(())
            })
        })
        .named("stopper");
        assert_eq!(mw.name(), "stopper");

        let mut req = Request::new(HttpMethod::Get, "/");
        let mut res = Response::new();
        let next = Next::new();
        mw.handle(&mut req, &mut res, next.clone()).await.unwrap();
        assert!(!next.is_advanced());
        assert!(res.is_sent());
    }

    #[tokio::test]
    async fn test_advance_from_spawned_task_wakes_waiter() {
        let next = Next::new();
        let remote = next.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            remote.advance();
            remote.advance();
        });

        tokio::time::timeout(Duration::from_secs(1), next.advanced())
            .await
            .expect("advance should wake the waiter");
        assert!(next.is_advanced());
    }
}

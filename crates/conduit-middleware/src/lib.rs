//! # Conduit Middleware
//!
//! The middleware pipeline for the Conduit framework.
//!
//! Every request runs through three layers before reaching its handler:
//!
//! ```text
//! Request → CORS → global middleware → route middleware → handler
//! ```
//!
//! Each [`MiddlewareEntry`] carries its own timeout and a `critical` flag.
//! A middleware proceeds by calling [`Next::advance`], or ends the request by
//! finalizing the response. A failing critical entry aborts the request with
//! a 500; a failing non-critical entry is logged and skipped.
//!
//! ## Example
//!
//! ```
//! use conduit_middleware::{from_fn, MiddlewareEntry};
//!
//! let auth = MiddlewareEntry::new(from_fn(|req, res, next| {
//!     Box::pin(async move {
//!         if req.header("authorization").is_some() {
//!             next.advance();
//!         } else {
//!             res.set_status(http::StatusCode::UNAUTHORIZED)?;
//!             res.end()?;
//!         }
//!         Ok(())
//!     })
//! }))
//! .timeout_ms(500)
//! .critical(true);
//! # let _ = auth;
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod entry;
mod middleware;
pub mod pipeline;
pub mod stages;

pub use entry::MiddlewareEntry;
pub use middleware::{from_fn, FnMiddleware, Middleware, Next};
pub use pipeline::{Layer, Pipeline, PipelineOutcome, DEFAULT_MIDDLEWARE_TIMEOUT};

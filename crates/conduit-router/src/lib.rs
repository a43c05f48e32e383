//! Pattern routing for Conduit.
//!
//! Routes are declared on a [`Router`], bound into [`Route`]s and stored in a
//! [`RouteTable`] that the dispatcher scans per method in insertion order.
//! The first route whose pattern matches wins.
//!
//! # Patterns
//!
//! - `/users` - literal path
//! - `/users/{id}` - named parameter matching `[^/]+`
//! - `/users/{id}(\d+)` - named parameter with a custom regex
//!
//! Every pattern also matches with a trailing slash. Parameter values are
//! captured raw, without percent-decoding.
//!
//! # Example
//!
//! ```rust
//! use conduit_core::{ControllerRegistry, Endpoint, HttpMethod};
//! use conduit_router::{Lookup, Route, RouteTable, Router};
//!
//! let mut router = Router::new();
//! router
//!     .get("/orgs/{org}/users/{user}", Endpoint::new(|_req, res, _deps| {
//!         Box::pin(async move {
//!             res.end()?;
//!             Ok(())
//!         })
//!     }))
//!     .unwrap();
//!
//! let registry = ControllerRegistry::new();
//! let mut table = RouteTable::new();
//! table
//!     .insert_all(
//!         router
//!             .routes()
//!             .map(|(method, path, def)| Route::bind(method, path, def, &registry))
//!             .collect(),
//!     )
//!     .unwrap();
//!
//! match table.find(HttpMethod::Get, "/orgs/acme/users/7") {
//!     Lookup::Found { params, .. } => {
//!         assert_eq!(params["org"].as_deref(), Some("acme"));
//!         assert_eq!(params["user"].as_deref(), Some("7"));
//!     }
//!     _ => unreachable!(),
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod pattern;
mod route;
mod router;
mod table;

pub use conduit_core::HttpMethod;
pub use pattern::{normalize_path, PathMatcher};
pub use route::Route;
pub use router::{RouteDefinition, RouteHandle, Router};
pub use table::{Lookup, RouteTable, UnloadRoute};

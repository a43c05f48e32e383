//! # Conduit Server
//!
//! The request dispatcher and HTTP server for the Conduit framework.
//!
//! - [`Dispatcher`] matches routes, runs the CORS, global and route
//!   middleware layers and calls the handler with its dependencies
//! - [`Server`] accepts HTTP/1.1 connections with hyper and feeds them to a
//!   shared dispatcher
//! - [`ShutdownSignal`] stops the server gracefully
//!
//! ## Example
//!
//! ```rust,ignore
//! use conduit_config::ConfigLoader;
//! use conduit_core::Endpoint;
//! use conduit_router::Router;
//! use conduit_server::{Dispatcher, Server};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().with_env_prefix("CONDUIT").load()?;
//!     let dispatcher = Arc::new(Dispatcher::new(config)?);
//!
//!     let mut router = Router::with_prefix("/api");
//!     router.get("/user/{id}(\\d+)", Endpoint::new(|req, res, _deps| Box::pin(async move {
//!         res.json(&serde_json::json!({ "id": req.param("id") }))?;
//!         Ok(())
//!     })))?;
//!     dispatcher.load_router(&router)?;
//!
//!     Server::new(dispatcher).serve().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cors;
mod dispatcher;
mod query;
mod server;
pub mod shutdown;

pub use cors::cors_from_settings;
pub use dispatcher::Dispatcher;
pub use query::parse_query;
pub use server::{Server, ServerError};
pub use shutdown::{ShutdownReceiver, ShutdownSignal};

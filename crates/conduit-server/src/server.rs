//! HTTP/1 server.
//!
//! Accepts TCP connections, serves each with hyper on its own task, buffers
//! the request body and hands the request to the [`Dispatcher`].
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_config::ConduitConfig;
//! use conduit_server::{Dispatcher, Server};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = Arc::new(Dispatcher::new(ConduitConfig::default())?);
//!     Server::new(dispatcher).serve().await?;
//!     Ok(())
//! }
//! ```

use crate::dispatcher::Dispatcher;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("Bind error: {0}")]
    BindError(String),

    /// An I/O error outside a single connection.
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Serves a [`Dispatcher`] over HTTP/1.1.
#[derive(Debug, Clone)]
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    addr: String,
    shutdown_timeout: Duration,
}

impl Server {
    /// Creates a server using the dispatcher's `server` settings.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let settings = &dispatcher.config().server;
        let addr = settings.addr();
        let shutdown_timeout = Duration::from_secs(settings.shutdown_timeout_secs);
        Self {
            dispatcher,
            addr,
            shutdown_timeout,
        }
    }

    /// Overrides the bind address.
    #[must_use]
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Overrides how long shutdown waits for open connections.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Returns the bind address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Serves until SIGTERM or SIGINT.
    pub async fn serve(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.serve_with_shutdown(shutdown).await
    }

    /// Binds the configured address and serves until `shutdown` fires.
    pub async fn serve_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.addr.as_str())
            .await
            .map_err(|e| ServerError::BindError(format!("failed to bind to {}: {e}", self.addr)))?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` fires.
    ///
    /// Once triggered, no new connections are accepted and open ones are
    /// given up to the shutdown timeout to finish.
    pub async fn serve_listener(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::IoError(e.to_string()))?;
        tracing::info!(addr = %local, "server listening");

        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let dispatcher = Arc::clone(&self.dispatcher);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            if let Err(err) = serve_connection(dispatcher, stream, remote_addr, shutdown).await {
                                tracing::debug!(remote = %remote_addr, error = %err, "connection error");
                            }
                            drop(token);
                        });
                    }
                    Err(err) => tracing::error!(error = %err, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    tracing::info!("shutdown signal received, no longer accepting");
                    break;
                }
            }
        }

        tracing::info!(
            timeout = ?self.shutdown_timeout,
            connections = tracker.active_connections(),
            "waiting for open connections"
        );
        tokio::select! {
            () = tracker.wait_for_idle() => tracing::info!("all connections closed"),
            () = tokio::time::sleep(self.shutdown_timeout) => tracing::warn!(
                connections = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            ),
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

async fn serve_connection(
    dispatcher: Arc<Dispatcher>,
    stream: TcpStream,
    remote_addr: SocketAddr,
    shutdown: ShutdownSignal,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: http::Request<Incoming>| {
        let dispatcher = Arc::clone(&dispatcher);
        async move { handle_request(&dispatcher, req, remote_addr).await }
    });

    let conn = http1::Builder::new().serve_connection(io, service);

    tokio::select! {
        result = conn => result,
        () = shutdown.recv() => {
            tracing::debug!(remote = %remote_addr, "connection closed for shutdown");
            Ok(())
        }
    }
}

async fn handle_request(
    dispatcher: &Dispatcher,
    req: http::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            tracing::warn!(remote = %remote_addr, error = %err, "failed to read request body");
            let mut response = http::Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    Ok(dispatcher
        .handle_http(http::Request::from_parts(parts, body), Some(remote_addr))
        .await)
}

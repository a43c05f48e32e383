//! # Conduit Core
//!
//! Core types shared by every Conduit crate:
//!
//! - [`Request`] / [`Response`] - per-request state and the send-once response
//! - [`ConduitError`] - the framework error taxonomy
//! - [`DependencyContainer`] - key-based dependency injection with lifecycles
//! - [`Endpoint`] - handler normalization (functions and controller actions)
//! - [`Controller`] / [`ControllerRegistry`] - controller capability and singletons
//! - [`keys_from_signature`] - lexical dependency-key extraction

#![doc(html_root_url = "https://docs.rs/conduit-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod controller;
pub mod di;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod signature;

pub use controller::{Controller, ControllerMethod, ControllerRegistry};
pub use di::{Dependencies, DependencyContainer, DependencyInfo, DependencyKeys, Lifecycle, Provider};
pub use error::{ConduitError, ConduitResult, PathSegment, ValidationIssue};
pub use handler::{handler_fn, BoxFuture, Endpoint, HandlerFn};
pub use method::HttpMethod;
pub use request::{ParamMap, Request, RequestId};
pub use response::Response;
pub use signature::keys_from_signature;

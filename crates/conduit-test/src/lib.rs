//! # Conduit Test
//!
//! In-memory testing for Conduit applications. Requests go through the same
//! [`Dispatcher::handle_http`](conduit_server::Dispatcher::handle_http) path
//! the server uses, without binding a port.
//!
//! ## Example
//!
//! ```ignore
//! use conduit_test::TestClient;
//! use http::StatusCode;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_user() {
//!     let client = TestClient::from_config(ConduitConfig::default()).unwrap();
//!     client.dispatcher().load_router(&users_router()).unwrap();
//!
//!     client
//!         .post("/users")
//!         .json(&json!({ "name": "Alice" }))
//!         .send()
//!         .await
//!         .assert_status(StatusCode::CREATED)
//!         .assert_json_field("name", &json!("Alice"));
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::{TestRequest, TestRequestBuilder};
pub use response::TestResponse;

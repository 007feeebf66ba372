//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, WsClient, CUSTOMER_EMAIL, TEST_PASS};
//!
//! #[tokio::test]
//! async fn test_list_services() {
//!     let server = TestServer::spawn().await;
//!     let mut client = WsClient::connect(&server).await;
//!     client.authenticate(CUSTOMER_EMAIL, TEST_PASS).await;
//!
//!     let response = client.request("services_list", serde_json::json!({})).await;
//!     assert!(response["result"].is_array());
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
pub use client::WsClient;
pub use constants::*;
#[allow(unused_imports)]
pub use server::{TestServer, TestServerOptions};

//! Salon MCP Gateway Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod handlers;
pub mod mcp;
pub mod security;
pub mod server;
pub mod user;

// Re-export commonly used types for convenience
pub use mcp::{Gateway, GatewayBuilder, GatewayConfig};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
pub use user::{InMemoryUserStore, UserRole, UserStore};

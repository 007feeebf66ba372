//! MCP Command Gateway
//!
//! Accepts JSON commands over a WebSocket, screens them (rate limit, risk
//! classifier, role and resource permissions) and routes them to the
//! registered business handlers.
//!
//! ## Architecture
//!
//! - Transport: WebSocket at `/mcp`
//! - Auth: in-band `authenticate` command, identity kept per connection
//! - Handlers: flat method namespace, each method carrying its permission entry
//! - Events: topic subscriptions pushed on the same socket

pub mod builtin;
pub mod context;
pub mod gateway;
pub mod handler;
pub mod protocol;
pub mod pubsub;
pub mod rate_limit;
pub mod registry;
pub mod session;

pub use context::{CommandContext, ResourceFacts};
pub use gateway::{Gateway, GatewayBuilder, GatewayConfig};
pub use handler::mcp_handler;
pub use protocol::{GatewayError, McpRequest, McpResponse, RequestId};
pub use registry::{CommandScope, CommandSpec, Handler, HandlerError, HandlerRegistry};
pub use session::{ConnectionState, Session};

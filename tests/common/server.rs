//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own gateway and sample store.

use super::constants::*;
use super::fixtures::{test_users, FixtureHandler};
use salon_mcp_gateway::handlers::{default_handlers, SalonStore};
use salon_mcp_gateway::mcp::rate_limit::RateLimitConfig;
use salon_mcp_gateway::mcp::{Gateway, GatewayConfig};
use salon_mcp_gateway::security::SecurityEventLog;
use salon_mcp_gateway::server::{make_app, RequestsLoggingLevel, ServerConfig};
use salon_mcp_gateway::InMemoryUserStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Knobs for tests that need a non-default gateway.
#[derive(Debug, Clone, Default)]
pub struct TestServerOptions {
    pub rate_limit: Option<RateLimitConfig>,
    pub gateway: Option<GatewayConfig>,
}

/// Test server instance with an isolated gateway
///
/// When dropped, the server gracefully shuts down.
pub struct TestServer {
    /// Base URL for HTTP requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// WebSocket URL of the gateway endpoint
    pub ws_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Direct access to the gateway, for asserting on security events
    pub gateway: Arc<Gateway>,

    // Private fields - keep resources alive until drop
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port with default settings
    pub async fn spawn() -> Self {
        Self::spawn_with(TestServerOptions::default()).await
    }

    /// Spawns a new test server on a random port
    ///
    /// # Panics
    ///
    /// Panics if the gateway cannot be built, binding fails or the server
    /// doesn't become ready within timeout.
    pub async fn spawn_with(options: TestServerOptions) -> Self {
        let store = Arc::new(SalonStore::with_demo_data());
        let event_log = Arc::new(SecurityEventLog::default());

        let mut builder = Gateway::builder(Arc::new(InMemoryUserStore::new(test_users())))
            .event_log(event_log.clone())
            .handlers(default_handlers(store, event_log))
            .handler(Arc::new(FixtureHandler));
        if let Some(rate_limit) = options.rate_limit {
            builder = builder.rate_limit(rate_limit);
        }
        if let Some(gateway) = options.gateway {
            builder = builder.config(gateway);
        }
        let gateway = Arc::new(builder.build().expect("Failed to build gateway"));

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");

        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let config = ServerConfig {
            port,
            requests_logging_level: RequestsLoggingLevel::None,
            ..Default::default()
        };
        let app = make_app(config, gateway.clone());

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("Server failed");
        });

        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            ws_url: format!("ws://127.0.0.1:{}/mcp", port),
            port,
            gateway,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the /health endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/health", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Send shutdown signal
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

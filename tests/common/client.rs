//! WebSocket client for the gateway endpoint
//!
//! Responses may arrive out of order and interleaved with topic events, so
//! everything received while waiting for one message is buffered for later.
#![allow(dead_code)]

use super::constants::*;
use super::server::TestServer;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub struct WsClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pending: VecDeque<Value>,
    next_id: u64,
}

impl WsClient {
    pub async fn connect(server: &TestServer) -> Self {
        let (ws, _) = connect_async(server.ws_url.as_str())
            .await
            .expect("Failed to connect to gateway WebSocket");
        Self {
            ws,
            pending: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Connects and authenticates with the shared test password.
    pub async fn connect_as(server: &TestServer, email: &str) -> Self {
        let mut client = Self::connect(server).await;
        client.authenticate(email, TEST_PASS).await;
        client
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws
            .send(Message::text(text.to_string()))
            .await
            .expect("Failed to send frame");
    }

    /// Sends a request without waiting; returns its id.
    pub async fn send(&mut self, method: &str, params: Value) -> String {
        let id = format!("req-{}", self.next_id);
        self.next_id += 1;
        let frame = json!({ "id": id, "method": method, "params": params });
        self.send_raw(&frame.to_string()).await;
        id
    }

    /// Sends a request and waits for its response.
    pub async fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.send(method, params).await;
        self.wait_for_response(&json!(id)).await
    }

    pub async fn authenticate(&mut self, email: &str, password: &str) -> Value {
        let response = self
            .request(
                "authenticate",
                json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(
            response["result"]["authenticated"], true,
            "authentication failed: {}",
            response
        );
        response
    }

    pub async fn wait_for_response(&mut self, id: &Value) -> Value {
        self.wait_for(|msg| msg.get("id") == Some(id))
            .await
            .unwrap_or_else(|| panic!("No response for id {}", id))
    }

    pub async fn wait_for_event(&mut self, topic: &str) -> Option<Value> {
        self.wait_for(|msg| msg["type"] == "event" && msg["topic"] == topic)
            .await
    }

    /// An event already read off the socket, without waiting for more.
    /// Pair with a request round trip to flush anything in flight.
    pub fn buffered_event(&mut self, topic: &str) -> Option<Value> {
        let pos = self
            .pending
            .iter()
            .position(|msg| msg["type"] == "event" && msg["topic"] == topic)?;
        self.pending.remove(pos)
    }

    async fn wait_for(&mut self, matches: impl Fn(&Value) -> bool) -> Option<Value> {
        if let Some(pos) = self.pending.iter().position(&matches) {
            return self.pending.remove(pos);
        }

        let pending = &mut self.pending;
        let ws = &mut self.ws;
        timeout(Duration::from_millis(RESPONSE_TIMEOUT_MS), async {
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    let value: Value =
                        serde_json::from_str(&text).expect("Server sent invalid JSON");
                    if matches(&value) {
                        return Some(value);
                    }
                    pending.push_back(value);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

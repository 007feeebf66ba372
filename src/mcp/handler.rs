//! Gateway WebSocket Handler
//!
//! One socket carries many concurrent requests. Each text frame is dispatched
//! on its own task; responses and topic events are funnelled through the
//! connection's outgoing channel to a single writer, so they may arrive out
//! of order and clients correlate them by `id`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::gateway::Gateway;
use super::protocol::OutgoingMessage;
use super::session::Session;
use crate::server::metrics;

/// WebSocket upgrade handler for `GET /mcp`.
pub async fn mcp_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(gateway): State<Arc<Gateway>>,
) -> Response {
    // The slot is claimed before the upgrade so concurrent handshakes
    // cannot overshoot the limit.
    let Some(slot) = gateway.try_reserve_connection() else {
        warn!(
            "Refusing connection from {}: {} connections open",
            peer,
            gateway.config().max_connections
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    debug!("Gateway WebSocket upgrade from {}", peer);
    ws.on_upgrade(move |socket| handle_socket(socket, peer, gateway, slot))
}

/// Handle an established gateway connection.
async fn handle_socket(
    socket: WebSocket,
    peer: SocketAddr,
    gateway: Arc<Gateway>,
    _slot: OwnedSemaphorePermit,
) {
    let session = Arc::new(Session::new(Some(peer)));
    let (outgoing_tx, outgoing_rx) = gateway.broker().register(session.id()).await;
    if let Err(e) = session.mark_open() {
        error!("Session {} could not open: {}", session.id(), e);
        gateway.broker().unregister(session.id()).await;
        return;
    }
    metrics::connection_opened();
    info!("Connection {} opened from {}", session.id(), peer);

    let (ws_sink, ws_stream) = socket.split();
    let writer = tokio::spawn(forward_outgoing(ws_sink, outgoing_rx));

    let mut in_flight = JoinSet::new();
    process_incoming(ws_stream, &gateway, &session, &outgoing_tx, &mut in_flight).await;

    // Dropping the set aborts requests still being processed.
    session.begin_close();
    let aborted = in_flight.len();
    drop(in_flight);
    gateway.broker().unregister(session.id()).await;
    drop(outgoing_tx);
    writer.abort();
    session.close();
    metrics::connection_closed();

    info!(
        "Connection {} closed ({} requests aborted)",
        session.id(),
        aborted
    );
}

async fn process_incoming(
    mut ws_stream: SplitStream<WebSocket>,
    gateway: &Arc<Gateway>,
    session: &Arc<Session>,
    outgoing_tx: &mpsc::Sender<OutgoingMessage>,
    in_flight: &mut JoinSet<()>,
) {
    while let Some(result) = ws_stream.next().await {
        // Reap finished request tasks so the set does not grow unbounded.
        while in_flight.try_join_next().is_some() {}

        match result {
            Ok(Message::Text(text)) => {
                let gateway = gateway.clone();
                let session = session.clone();
                let tx = outgoing_tx.clone();
                in_flight.spawn(async move {
                    let response = gateway.dispatch_text(text.as_str(), &session).await;
                    if tx.send(OutgoingMessage::Response(response)).await.is_err() {
                        debug!("Connection {} gone before response", session.id());
                    }
                });
            }
            Ok(Message::Binary(_)) => {
                debug!("Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!("Received close frame on {}", session.id());
                break;
            }
            Err(e) => {
                debug!("WebSocket error on {}: {}", session.id(), e);
                break;
            }
        }
    }
}

/// Forward messages from the outgoing channel to the WebSocket.
async fn forward_outgoing(
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outgoing_rx: mpsc::Receiver<OutgoingMessage>,
) {
    while let Some(msg) = outgoing_rx.recv().await {
        match serde_json::to_string(&msg) {
            Ok(json) => {
                if ws_sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to serialize gateway message: {}", e);
            }
        }
    }
}

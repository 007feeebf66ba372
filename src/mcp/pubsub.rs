//! Topic broker for gateway connections.
//!
//! Tracks every live connection's outgoing channel, the identity it acts as
//! and the topics it subscribed to. Subscriptions live exactly as long as the
//! connection: unregistering a connection drops all of them.
//!
//! An event only reaches a subscriber allowed to `read` the record it
//! describes, judged with the same row-level rules as a direct request.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use super::context::ResourceFacts;
use super::protocol::{OutgoingMessage, ServerEvent};
use crate::user::policy::can_access_resource;
use crate::user::EvaluationContext;

/// Outgoing queue depth per connection.
pub const OUTGOING_CHANNEL_CAPACITY: usize = 64;

/// Topics clients may subscribe to, with the resource whose `read` permission
/// a subscriber needs.
pub const TOPICS: &[(&str, &str)] = &[
    ("users", "users"),
    ("customers", "customers"),
    ("appointments", "appointments"),
    ("services", "services"),
    ("products", "products"),
    ("orders", "payments"),
];

pub fn topic_resource(topic: &str) -> Option<&'static str> {
    TOPICS
        .iter()
        .find(|(name, _)| *name == topic)
        .map(|(_, resource)| *resource)
}

struct ConnectionEntry {
    sender: mpsc::Sender<OutgoingMessage>,
    topics: HashSet<String>,
    /// Identity events are filtered for. Guest until the connection
    /// authenticates.
    viewer: EvaluationContext,
}

impl ConnectionEntry {
    fn may_read(&self, resource: &str, facts: &ResourceFacts) -> bool {
        let mut viewer = self.viewer.clone();
        facts.clone().apply(&mut viewer);
        can_access_resource(&viewer, "read", resource)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubscribeError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("connection is not registered")]
    NotConnected,
}

/// Owns the outgoing channels of all connections.
pub struct TopicBroker {
    connections: RwLock<HashMap<String, ConnectionEntry>>,
}

impl Default for TopicBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicBroker {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the sending half (for responses produced by request tasks)
    /// and the receiver the connection writer drains into the socket.
    pub async fn register(
        &self,
        connection_id: &str,
    ) -> (mpsc::Sender<OutgoingMessage>, mpsc::Receiver<OutgoingMessage>) {
        let (tx, rx) = mpsc::channel(OUTGOING_CHANNEL_CAPACITY);
        let mut conns = self.connections.write().await;
        conns.insert(
            connection_id.to_string(),
            ConnectionEntry {
                sender: tx.clone(),
                topics: HashSet::new(),
                viewer: EvaluationContext::default(),
            },
        );
        (tx, rx)
    }

    /// Unregister a connection (called on disconnect), dropping its subscriptions.
    pub async fn unregister(&self, connection_id: &str) {
        self.connections.write().await.remove(connection_id);
    }

    /// Sets the identity a connection's events are filtered for. Called when
    /// the connection authenticates or logs out.
    pub async fn set_viewer(&self, connection_id: &str, viewer: EvaluationContext) {
        if let Some(entry) = self.connections.write().await.get_mut(connection_id) {
            entry.viewer = viewer;
        }
    }

    /// Returns true if the topic was newly subscribed.
    pub async fn subscribe(
        &self,
        connection_id: &str,
        topic: &str,
    ) -> Result<bool, SubscribeError> {
        if topic_resource(topic).is_none() {
            return Err(SubscribeError::UnknownTopic(topic.to_string()));
        }
        let mut conns = self.connections.write().await;
        let entry = conns
            .get_mut(connection_id)
            .ok_or(SubscribeError::NotConnected)?;
        Ok(entry.topics.insert(topic.to_string()))
    }

    /// Returns true if the connection was subscribed to the topic.
    pub async fn unsubscribe(
        &self,
        connection_id: &str,
        topic: &str,
    ) -> Result<bool, SubscribeError> {
        let mut conns = self.connections.write().await;
        let entry = conns
            .get_mut(connection_id)
            .ok_or(SubscribeError::NotConnected)?;
        Ok(entry.topics.remove(topic))
    }

    pub async fn subscriptions(&self, connection_id: &str) -> Vec<String> {
        let conns = self.connections.read().await;
        let mut topics: Vec<String> = conns
            .get(connection_id)
            .map(|entry| entry.topics.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    /// Publish an event about a record to every subscriber of `topic` that
    /// may read it. `facts` describe the record (owner, tenant, staff).
    ///
    /// Never waits on a slow consumer: a full queue drops the event for that
    /// connection. Returns the number of connections the event was queued for.
    pub async fn publish(&self, topic: &str, payload: Value, facts: ResourceFacts) -> usize {
        let Some(resource) = topic_resource(topic) else {
            warn!("Not publishing to unknown topic {}", topic);
            return 0;
        };
        let event = ServerEvent::new(topic, payload);
        let conns = self.connections.read().await;
        let mut delivered = 0;

        for (connection_id, entry) in conns.iter() {
            if !entry.topics.contains(topic) {
                continue;
            }
            if !entry.may_read(resource, &facts) {
                debug!("Withholding {} event from {}", topic, connection_id);
                continue;
            }
            match entry
                .sender
                .try_send(OutgoingMessage::Event(event.clone()))
            {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        "Dropping {} event for connection {}: queue full",
                        topic, connection_id
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Connection {} closed before {} event", connection_id, topic);
                }
            }
        }

        delivered
    }

    /// Get the total number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_connected(&self, connection_id: &str) -> bool {
        self.connections.read().await.contains_key(connection_id)
    }
}

//! Per-connection session state.
//!
//! A session tracks the connection lifecycle and the identity attached to it.
//! It is shared by the request tasks of a single connection only.

use std::net::SocketAddr;
use std::sync::RwLock;

use serde::Serialize;

use crate::user::{UserContext, UserRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Authenticating,
    Authenticated,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Whether requests are still accepted in this state.
    pub fn accepts_requests(self) -> bool {
        matches!(
            self,
            ConnectionState::Open | ConnectionState::Authenticating | ConnectionState::Authenticated
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid session transition from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

#[derive(Debug)]
struct SessionInner {
    state: ConnectionState,
    user: Option<UserContext>,
}

#[derive(Debug)]
pub struct Session {
    id: String,
    peer: Option<SocketAddr>,
    inner: RwLock<SessionInner>,
}

impl Session {
    pub fn new(peer: Option<SocketAddr>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            peer,
            inner: RwLock::new(SessionInner {
                state: ConnectionState::Connecting,
                user: None,
            }),
        }
    }

    /// Session that is already open, for dispatching outside a socket.
    pub fn open(peer: Option<SocketAddr>) -> Self {
        let session = Self::new(peer);
        session.inner.write().unwrap().state = ConnectionState::Open;
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.read().unwrap().state
    }

    pub fn user(&self) -> Option<UserContext> {
        self.inner.read().unwrap().user.clone()
    }

    pub fn role(&self) -> UserRole {
        self.inner
            .read()
            .unwrap()
            .user
            .as_ref()
            .map_or(UserRole::Guest, |u| u.role)
    }

    /// Key used for rate limiting: the user once authenticated, the peer
    /// address before that.
    pub fn client_key(&self) -> String {
        if let Some(user) = self.inner.read().unwrap().user.as_ref() {
            return format!("user:{}", user.id);
        }
        match self.peer {
            Some(addr) => format!("addr:{}", addr.ip()),
            None => format!("session:{}", self.id),
        }
    }

    fn transition(
        &self,
        allowed_from: &[ConnectionState],
        to: ConnectionState,
    ) -> Result<(), TransitionError> {
        let mut inner = self.inner.write().unwrap();
        if !allowed_from.contains(&inner.state) {
            return Err(TransitionError {
                from: inner.state,
                to,
            });
        }
        inner.state = to;
        Ok(())
    }

    pub fn mark_open(&self) -> Result<(), TransitionError> {
        self.transition(&[ConnectionState::Connecting], ConnectionState::Open)
    }

    pub fn begin_authentication(&self) -> Result<(), TransitionError> {
        self.transition(
            &[ConnectionState::Open, ConnectionState::Authenticated],
            ConnectionState::Authenticating,
        )
    }

    /// Completes an authentication attempt. On failure the session falls back
    /// to whatever identity it had before.
    pub fn finish_authentication(&self, user: Option<UserContext>) {
        let mut inner = self.inner.write().unwrap();
        if inner.state != ConnectionState::Authenticating {
            return;
        }
        if let Some(user) = user {
            inner.user = Some(user);
        }
        inner.state = if inner.user.is_some() {
            ConnectionState::Authenticated
        } else {
            ConnectionState::Open
        };
    }

    /// Drops the attached identity. Returns the user that was logged out.
    pub fn logout(&self) -> Option<UserContext> {
        let mut inner = self.inner.write().unwrap();
        if !inner.state.accepts_requests() {
            return None;
        }
        inner.state = ConnectionState::Open;
        inner.user.take()
    }

    pub fn begin_close(&self) {
        let mut inner = self.inner.write().unwrap();
        if inner.state != ConnectionState::Closed {
            inner.state = ConnectionState::Closing;
        }
    }

    /// Final transition; the identity is discarded with the connection.
    pub fn close(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.state = ConnectionState::Closed;
        inner.user = None;
    }
}

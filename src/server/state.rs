use axum::extract::FromRef;

use crate::mcp::Gateway;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedGateway = Arc<Gateway>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub gateway: GuardedGateway,
    pub hash: String,
}

impl ServerState {
    pub fn new(config: ServerConfig, gateway: GuardedGateway) -> Self {
        ServerState {
            config,
            start_time: Instant::now(),
            gateway,
            hash: format!("{}-{}", env!("APP_VERSION"), env!("GIT_HASH")),
        }
    }
}

impl FromRef<ServerState> for GuardedGateway {
    fn from_ref(input: &ServerState) -> Self {
        input.gateway.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::user::UserRecord;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub users_file: Option<String>,

    // Feature configs
    pub rate_limit: Option<RateLimitFileConfig>,
    pub security: Option<SecurityFileConfig>,
    pub event_log: Option<EventLogFileConfig>,
    pub gateway: Option<GatewayFileConfig>,

    /// Accounts declared inline with `[[users]]`.
    pub users: Vec<UserRecord>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RateLimitFileConfig {
    pub window_ms: Option<u64>,
    pub max_requests: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SecurityFileConfig {
    /// Replaces the built-in high-risk list when present.
    pub high_risk_patterns: Option<Vec<String>>,
    /// Replaces the built-in sensitive list when present.
    pub sensitive_patterns: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EventLogFileConfig {
    pub capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct GatewayFileConfig {
    pub request_timeout_ms: Option<u64>,
    pub max_connections: Option<usize>,
}

/// Standalone accounts file, `[[users]]` entries only.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct UsersFile {
    users: Vec<UserRecord>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

pub fn load_users_file(path: &Path) -> Result<Vec<UserRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read users file: {:?}", path))?;
    let file: UsersFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse users file: {:?}", path))?;
    Ok(file.users)
}

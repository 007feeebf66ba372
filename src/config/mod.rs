mod file_config;

pub use file_config::{
    load_users_file, EventLogFileConfig, FileConfig, GatewayFileConfig, RateLimitFileConfig,
    SecurityFileConfig,
};

use crate::mcp::rate_limit::RateLimitConfig;
use crate::mcp::GatewayConfig;
use crate::security::classifier::{
    compile_patterns, DEFAULT_HIGH_RISK_PATTERNS, DEFAULT_SENSITIVE_PATTERNS,
};
use crate::security::event_log::DEFAULT_EVENT_LOG_CAPACITY;
use crate::security::SecurityClassifier;
use crate::server::RequestsLoggingLevel;
use crate::user::UserRecord;
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub users_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    // Gateway settings (with defaults)
    pub rate_limit: RateLimitConfig,
    pub security: SecuritySettings,
    pub event_log_capacity: usize,
    pub gateway: GatewayConfig,

    /// Inline `[[users]]` followed by the users file, if any.
    pub users: Vec<UserRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecuritySettings {
    pub high_risk_patterns: Vec<String>,
    pub sensitive_patterns: Vec<String>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            high_risk_patterns: DEFAULT_HIGH_RISK_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            sensitive_patterns: DEFAULT_SENSITIVE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl SecuritySettings {
    pub fn classifier(&self) -> Result<SecurityClassifier> {
        SecurityClassifier::new(&self.high_risk_patterns[..], &self.sensitive_patterns[..])
            .context("Invalid security pattern")
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = match file.logging_level {
            Some(s) => match parse_logging_level(&s) {
                Some(level) => level,
                None => bail!("Unknown logging_level in config file: {}", s),
            },
            None => cli.logging_level.clone(),
        };

        let rl_file = file.rate_limit.unwrap_or_default();
        let rl_default = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            window_ms: rl_file.window_ms.unwrap_or(rl_default.window_ms),
            max_requests: rl_file.max_requests.unwrap_or(rl_default.max_requests),
        };
        if rate_limit.window_ms == 0 {
            bail!("rate_limit.window_ms must be greater than zero");
        }
        if rate_limit.max_requests == 0 {
            bail!("rate_limit.max_requests must be greater than zero");
        }

        let sec_file = file.security.unwrap_or_default();
        let sec_default = SecuritySettings::default();
        let security = SecuritySettings {
            high_risk_patterns: sec_file
                .high_risk_patterns
                .unwrap_or(sec_default.high_risk_patterns),
            sensitive_patterns: sec_file
                .sensitive_patterns
                .unwrap_or(sec_default.sensitive_patterns),
        };
        compile_patterns(&security.high_risk_patterns[..])
            .context("Invalid regex in security.high_risk_patterns")?;
        compile_patterns(&security.sensitive_patterns[..])
            .context("Invalid regex in security.sensitive_patterns")?;

        let event_log_capacity = file
            .event_log
            .and_then(|e| e.capacity)
            .unwrap_or(DEFAULT_EVENT_LOG_CAPACITY);
        if event_log_capacity == 0 {
            bail!("event_log.capacity must be greater than zero");
        }

        let gw_file = file.gateway.unwrap_or_default();
        let gw_default = GatewayConfig::default();
        let gateway = GatewayConfig {
            request_timeout: gw_file
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(gw_default.request_timeout),
            max_connections: gw_file
                .max_connections
                .unwrap_or(gw_default.max_connections),
        };
        if gateway.request_timeout.is_zero() {
            bail!("gateway.request_timeout_ms must be greater than zero");
        }
        if gateway.max_connections == 0 {
            bail!("gateway.max_connections must be greater than zero");
        }

        let mut users = file.users;
        let users_file = file
            .users_file
            .map(PathBuf::from)
            .or_else(|| cli.users_file.clone());
        if let Some(path) = users_file {
            users.extend(load_users_file(&path)?);
        }
        let mut seen = std::collections::HashSet::new();
        for user in &users {
            if !seen.insert(user.id.as_str()) {
                bail!("Duplicate user id in configuration: {}", user.id);
            }
        }

        Ok(Self {
            port,
            metrics_port,
            logging_level,
            rate_limit,
            security,
            event_log_capacity,
            gateway,
            users,
        })
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

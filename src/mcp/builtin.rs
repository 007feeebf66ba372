//! Commands served by the gateway itself.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::context::CommandContext;
use super::protocol::methods;
use super::pubsub::{topic_resource, SubscribeError, TOPICS};
use super::registry::{
    parse_params, roles, to_result, CommandScope, CommandSpec, Handler, HandlerError,
    HandlerResult,
};
use crate::security::event_log::DEFAULT_RECENT_LIMIT;
use crate::security::{RiskLevel, SecurityEvent, SecurityEventLog, SecurityEventType};
use crate::user::permissions::{grants_action, role_definitions};
use crate::user::UserRole;

const fn open(method: &'static str, description: &'static str) -> CommandSpec {
    CommandSpec {
        method,
        resource: "session",
        action: "use",
        roles: roles::EVERYONE,
        scope: CommandScope::Open,
        description,
    }
}

const fn admin(
    method: &'static str,
    action: &'static str,
    description: &'static str,
) -> CommandSpec {
    CommandSpec {
        method,
        resource: "security",
        action,
        roles: roles::ADMIN_ONLY,
        scope: CommandScope::Collection,
        description,
    }
}

/// Session commands mutate the connection and are executed by the gateway
/// directly. Their names are reserved in the handler registry.
pub const SESSION_COMMANDS: &[CommandSpec] = &[
    open(methods::AUTHENTICATE, "Attach an identity to this connection"),
    open(methods::LOGOUT, "Drop the identity attached to this connection"),
];

pub fn session_command(method: &str) -> Option<&'static CommandSpec> {
    SESSION_COMMANDS.iter().find(|c| c.method == method)
}

pub fn reserved_methods() -> Vec<&'static str> {
    SESSION_COMMANDS.iter().map(|c| c.method).collect()
}

const GATEWAY_COMMANDS: &[CommandSpec] = &[
    open(methods::PING, "Liveness check"),
    open(methods::HEALTH, "Gateway health summary"),
    open(methods::SUBSCRIBE, "Receive change events for a topic"),
    open(methods::UNSUBSCRIBE, "Stop receiving change events for a topic"),
    admin(methods::SECURITY_EVENTS, "read", "Recent security events and metrics"),
    admin(methods::SECURITY_POLICIES, "read", "Role table and classifier summary"),
    admin(methods::SECURITY_LOG_INCIDENT, "create", "Record a security incident"),
];

#[derive(Debug, Deserialize)]
struct TopicParams {
    topic: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecurityEventsParams {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    since: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum IncidentType {
    JailbreakAttempt,
    SuspiciousActivity,
    AuthFailure,
    PermissionViolation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum IncidentRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogIncidentParams {
    #[serde(rename = "type")]
    incident_type: IncidentType,
    risk: IncidentRisk,
    message: String,
    #[serde(default)]
    context: Value,
}

pub struct GatewayHandler {
    event_log: Arc<SecurityEventLog>,
    start_time: Instant,
    pattern_counts: (usize, usize),
}

impl GatewayHandler {
    pub fn new(event_log: Arc<SecurityEventLog>, pattern_counts: (usize, usize)) -> Self {
        Self {
            event_log,
            start_time: Instant::now(),
            pattern_counts,
        }
    }

    async fn health(&self, ctx: &CommandContext) -> HandlerResult {
        Ok(json!({
            "status": "healthy",
            "uptimeSecs": self.start_time.elapsed().as_secs(),
            "connections": ctx.broker.connection_count().await,
            "version": format!("{}-{}", env!("APP_VERSION"), env!("GIT_HASH")),
        }))
    }

    async fn subscribe(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let TopicParams { topic } = parse_params(params)?;
        let resource = topic_resource(&topic).ok_or_else(|| {
            HandlerError::InvalidParams(format!(
                "unknown topic {}, expected one of {:?}",
                topic,
                TOPICS.iter().map(|(t, _)| *t).collect::<Vec<_>>()
            ))
        })?;

        if !grants_action(ctx.role(), "read", resource) {
            return Err(HandlerError::Forbidden {
                reason: format!("cannot subscribe to {}", topic),
                allowed_roles: UserRole::ALL
                    .into_iter()
                    .filter(|role| grants_action(*role, "read", resource))
                    .collect(),
            });
        }

        let subscribed = ctx
            .broker
            .subscribe(&ctx.session_id, &topic)
            .await
            .map_err(subscribe_error)?;
        Ok(json!({ "topic": topic, "subscribed": true, "new": subscribed }))
    }

    async fn unsubscribe(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let TopicParams { topic } = parse_params(params)?;
        let removed = ctx
            .broker
            .unsubscribe(&ctx.session_id, &topic)
            .await
            .map_err(subscribe_error)?;
        Ok(json!({ "topic": topic, "subscribed": false, "removed": removed }))
    }

    fn security_events(&self, params: Value) -> HandlerResult {
        let params: SecurityEventsParams = parse_params(params)?;
        let limit = params
            .limit
            .unwrap_or(DEFAULT_RECENT_LIMIT)
            .min(self.event_log.capacity());
        Ok(json!({
            "events": self.event_log.recent(limit, params.since),
            "metrics": self.event_log.metrics(),
        }))
    }

    fn security_policies(&self) -> HandlerResult {
        let roles: Vec<Value> = role_definitions()
            .iter()
            .map(|definition| {
                json!({
                    "role": definition.role,
                    "level": definition.role.level(),
                    "resources": definition
                        .permissions
                        .iter()
                        .map(|p| json!({
                            "resource": p.resource,
                            "actions": p.actions,
                            "conditional": !p.conditions.is_empty(),
                        }))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        Ok(json!({
            "roles": roles,
            "classifier": {
                "highRiskPatterns": self.pattern_counts.0,
                "sensitivePatterns": self.pattern_counts.1,
            },
            "eventLogCapacity": self.event_log.capacity(),
        }))
    }

    fn log_incident(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let params: LogIncidentParams = parse_params(params)?;
        let event_type = match params.incident_type {
            IncidentType::JailbreakAttempt => SecurityEventType::JailbreakAttempt,
            IncidentType::SuspiciousActivity => SecurityEventType::SuspiciousActivity,
            IncidentType::AuthFailure => SecurityEventType::AuthFailure,
            IncidentType::PermissionViolation => SecurityEventType::PermissionViolation,
        };
        let risk = match params.risk {
            IncidentRisk::Low => RiskLevel::Low,
            IncidentRisk::Medium => RiskLevel::Medium,
            IncidentRisk::High => RiskLevel::High,
        };
        let event = SecurityEvent::new(event_type, risk, params.message)
            .with_user(ctx.user_id().map(str::to_string))
            .with_session(ctx.session_id.clone())
            .with_context(json!({ "reported": params.context }));
        let id = event.id.clone();
        self.event_log.record(event);
        to_result(&json!({ "recorded": true, "id": id }))
    }
}

fn subscribe_error(err: SubscribeError) -> HandlerError {
    match err {
        SubscribeError::UnknownTopic(topic) => {
            HandlerError::InvalidParams(format!("unknown topic {}", topic))
        }
        SubscribeError::NotConnected => HandlerError::Failed(err.to_string()),
    }
}

#[async_trait]
impl Handler for GatewayHandler {
    fn namespace(&self) -> &'static str {
        "gateway"
    }

    fn commands(&self) -> &'static [CommandSpec] {
        GATEWAY_COMMANDS
    }

    async fn execute(&self, method: &str, params: Value, ctx: &CommandContext) -> HandlerResult {
        match method {
            methods::PING => Ok(json!({ "pong": true })),
            methods::HEALTH => self.health(ctx).await,
            methods::SUBSCRIBE => self.subscribe(params, ctx).await,
            methods::UNSUBSCRIBE => self.unsubscribe(params, ctx).await,
            methods::SECURITY_EVENTS => self.security_events(params),
            methods::SECURITY_POLICIES => self.security_policies(),
            methods::SECURITY_LOG_INCIDENT => self.log_incident(params, ctx),
            other => Err(HandlerError::Failed(format!(
                "gateway handler cannot execute {}",
                other
            ))),
        }
    }
}

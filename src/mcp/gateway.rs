//! Request dispatch pipeline.
//!
//! Every request passes, in order: envelope validation, rate limiting, risk
//! classification, method resolution, the role check, the resource check and
//! finally the handler, which runs isolated under a timeout.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::builtin::{reserved_methods, session_command, GatewayHandler};
use super::context::CommandContext;
use super::protocol::{decode_request, methods, GatewayError, McpRequest, McpResponse};
use super::pubsub::TopicBroker;
use super::rate_limit::{McpRateLimiter, RateLimitConfig};
use super::registry::{
    CommandScope, CommandSpec, Handler, HandlerError, HandlerRegistry, RegistryError,
    ResolvedCommand,
};
use super::session::Session;
use crate::security::{
    RiskLevel, SecurityClassifier, SecurityEvent, SecurityEventLog, SecurityEventType,
};
use crate::server::metrics;
use crate::user::permissions::grants_action;
use crate::user::policy::{can_access_resource, resource_policy};
use crate::user::{AuthError, Credentials, EvaluationContext, UserContext, UserStore};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Param keys whose values are never fed to the classifier.
const CREDENTIAL_KEYS: &[&str] = &["password", "token", "apiToken"];
const EVENT_INPUT_PREVIEW: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub request_timeout: Duration,
    pub max_connections: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

pub struct Gateway {
    config: GatewayConfig,
    registry: HandlerRegistry,
    rate_limiter: McpRateLimiter,
    classifier: SecurityClassifier,
    event_log: Arc<SecurityEventLog>,
    user_store: Arc<dyn UserStore>,
    broker: Arc<TopicBroker>,
    /// One permit per open connection, held until the socket closes.
    connection_slots: Arc<Semaphore>,
}

pub struct GatewayBuilder {
    config: GatewayConfig,
    rate_limit: RateLimitConfig,
    classifier: SecurityClassifier,
    event_log: Arc<SecurityEventLog>,
    user_store: Arc<dyn UserStore>,
    handlers: Vec<Arc<dyn Handler>>,
}

impl GatewayBuilder {
    pub fn new(user_store: Arc<dyn UserStore>) -> Self {
        Self {
            config: GatewayConfig::default(),
            rate_limit: RateLimitConfig::default(),
            classifier: SecurityClassifier::default(),
            event_log: Arc::new(SecurityEventLog::default()),
            user_store,
            handlers: Vec::new(),
        }
    }

    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn classifier(mut self, classifier: SecurityClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn event_log(mut self, event_log: Arc<SecurityEventLog>) -> Self {
        self.event_log = event_log;
        self
    }

    pub fn handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handlers(mut self, handlers: impl IntoIterator<Item = Arc<dyn Handler>>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    /// Builds the method table. Fails on the first clashing method.
    pub fn build(self) -> Result<Gateway, RegistryError> {
        let mut registry = HandlerRegistry::with_reserved(&reserved_methods());
        registry.register(Arc::new(GatewayHandler::new(
            self.event_log.clone(),
            (
                self.classifier.high_risk_pattern_count(),
                self.classifier.sensitive_pattern_count(),
            ),
        )))?;
        for handler in self.handlers {
            registry.register(handler)?;
        }

        info!(
            "Gateway initialized with {} handlers and {} methods",
            registry.handler_count(),
            registry.method_count()
        );

        Ok(Gateway {
            registry,
            rate_limiter: McpRateLimiter::new(self.rate_limit),
            classifier: self.classifier,
            event_log: self.event_log,
            user_store: self.user_store,
            broker: Arc::new(TopicBroker::new()),
            connection_slots: Arc::new(Semaphore::new(self.config.max_connections)),
            config: self.config,
        })
    }
}

impl Gateway {
    pub fn builder(user_store: Arc<dyn UserStore>) -> GatewayBuilder {
        GatewayBuilder::new(user_store)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn broker(&self) -> &Arc<TopicBroker> {
        &self.broker
    }

    pub fn event_log(&self) -> &Arc<SecurityEventLog> {
        &self.event_log
    }

    /// Claims a connection slot, or `None` once `max_connections` are open.
    /// The slot frees when the permit drops.
    pub fn try_reserve_connection(&self) -> Option<OwnedSemaphorePermit> {
        self.connection_slots.clone().try_acquire_owned().ok()
    }

    pub fn rate_limiter(&self) -> &McpRateLimiter {
        &self.rate_limiter
    }

    /// Decodes and dispatches one text frame. Frames that fail envelope
    /// validation are answered with the id they carried, if any.
    pub async fn dispatch_text(&self, text: &str, session: &Session) -> McpResponse {
        match decode_request(text) {
            Ok(request) => self.dispatch(request, session).await,
            Err((id, err)) => {
                debug!("Rejected malformed request on {}: {}", session.id(), err);
                metrics::record_request("invalid", err.kind(), Duration::ZERO);
                McpResponse::error(id, err)
            }
        }
    }

    pub async fn dispatch(&self, request: McpRequest, session: &Session) -> McpResponse {
        let started = Instant::now();
        let McpRequest {
            id, method, params, ..
        } = request;

        let outcome = self.process(&method, params, session).await;

        let known = session_command(&method).is_some() || self.registry.resolve(&method).is_some();
        let label = if known { method.as_str() } else { "unknown" };
        match &outcome {
            Ok(_) => {
                debug!("{} {} ok", session.id(), method);
                metrics::record_request(label, "ok", started.elapsed());
            }
            Err(err) => {
                debug!("{} {} failed: {}", session.id(), method, err);
                metrics::record_request(label, err.kind(), started.elapsed());
            }
        }

        match outcome {
            Ok(result) => McpResponse::success(id, result),
            Err(err) => McpResponse::error(Some(id), err),
        }
    }

    async fn process(
        &self,
        method: &str,
        params: Value,
        session: &Session,
    ) -> Result<Value, GatewayError> {
        if !session.state().accepts_requests() {
            return Err(GatewayError::InvalidRequest(format!(
                "connection is {:?}",
                session.state()
            )));
        }

        let client_key = session.client_key();
        if let Err(limited) = self.rate_limiter.check_and_record(&client_key) {
            let identifier_type = client_key.split(':').next().unwrap_or("unknown");
            metrics::record_rate_limit_hit(identifier_type);
            warn!("Rate limit exceeded for {}", client_key);
            return Err(GatewayError::RateLimited {
                reset_time: limited.reset_time,
            });
        }

        self.screen(method, &params, session)?;

        if session_command(method).is_some() {
            return self.session_command(method, params, session).await;
        }

        let resolved = self
            .registry
            .resolve(method)
            .ok_or_else(|| GatewayError::UnknownMethod(method.to_string()))?;

        // One budget covers the resource lookup and the handler call.
        let deadline = tokio::time::Instant::now() + self.config.request_timeout;
        let user = session.user();
        let mut evaluation = user
            .as_ref()
            .map(UserContext::evaluation_context)
            .unwrap_or_default();
        self.authorize(
            &resolved,
            &params,
            user.as_ref(),
            &mut evaluation,
            session,
            deadline,
        )
        .await?;

        let ctx = CommandContext {
            session_id: session.id().to_string(),
            user,
            evaluation,
            broker: self.broker.clone(),
        };
        self.execute(&resolved, method, params, &ctx, session, deadline)
            .await
    }

    /// Runs the classifier over the method name and params, with credential
    /// values removed.
    fn screen(&self, method: &str, params: &Value, session: &Session) -> Result<(), GatewayError> {
        let text = format!("{} {}", method, redact_credentials(params));
        let role = session.role();
        let classification = self
            .classifier
            .classify(&text, role.is_authorized_for_sensitive_data());

        if classification.risk == RiskLevel::Low {
            return Ok(());
        }

        let event_type = match classification.risk {
            RiskLevel::High => SecurityEventType::JailbreakAttempt,
            _ => SecurityEventType::SuspiciousActivity,
        };
        let context = json!({
            "input": text.chars().take(EVENT_INPUT_PREVIEW).collect::<String>(),
            "pattern": classification.matched_pattern,
            "method": method,
            "actions": classification.actions,
        });

        if !classification.is_blocked() {
            debug!(
                "Sensitive topic in {} allowed for {} ({})",
                method,
                role,
                session.id()
            );
            return Ok(());
        }

        self.event_log.record(
            SecurityEvent::new(
                event_type,
                classification.risk,
                format!("Blocked {} request", method),
            )
            .with_user(session.user().map(|u| u.id))
            .with_session(session.id())
            .with_context(context),
        );
        Err(GatewayError::SecurityViolation)
    }

    async fn authorize(
        &self,
        resolved: &ResolvedCommand,
        params: &Value,
        user: Option<&UserContext>,
        evaluation: &mut EvaluationContext,
        session: &Session,
        deadline: tokio::time::Instant,
    ) -> Result<(), GatewayError> {
        let spec = resolved.spec;
        let role = evaluation.user_role;

        if !spec.allows_role(role) {
            if user.is_none() {
                return Err(GatewayError::Unauthenticated);
            }
            return Err(self.deny(spec, session, "role not allowed for command"));
        }

        let allowed = match spec.scope {
            CommandScope::Open => true,
            CommandScope::Collection => {
                resource_policy(spec.resource).is_some_and(|p| p.is_public(spec.action))
                    || grants_action(role, spec.action, spec.resource)
            }
            CommandScope::Instance => {
                let lookup = resolved.handler.resource_facts(spec.method, params);
                self.guarded(resolved, spec.method, deadline, lookup)
                    .await?
                    .apply(evaluation);
                can_access_resource(evaluation, spec.action, spec.resource)
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(self.deny(spec, session, "resource conditions not met"))
        }
    }

    fn deny(&self, spec: &CommandSpec, session: &Session, reason: &str) -> GatewayError {
        self.record_violation(spec.method, session, reason);
        GatewayError::PermissionDenied {
            allowed_roles: spec.roles.to_vec(),
        }
    }

    fn record_violation(&self, method: &str, session: &Session, reason: &str) {
        self.event_log.record(
            SecurityEvent::new(
                SecurityEventType::PermissionViolation,
                RiskLevel::Medium,
                format!("Permission denied for {}", method),
            )
            .with_user(session.user().map(|u| u.id))
            .with_session(session.id())
            .with_context(json!({
                "method": method,
                "role": session.role(),
                "reason": reason,
            })),
        );
    }

    async fn execute(
        &self,
        resolved: &ResolvedCommand,
        method: &str,
        params: Value,
        ctx: &CommandContext,
        session: &Session,
        deadline: tokio::time::Instant,
    ) -> Result<Value, GatewayError> {
        let call = resolved.handler.execute(method, params, ctx);

        match self.guarded(resolved, method, deadline, call).await? {
            Ok(result) => Ok(result),
            Err(HandlerError::InvalidParams(message)) => Err(GatewayError::InvalidRequest(message)),
            Err(HandlerError::Forbidden {
                reason,
                allowed_roles,
            }) => {
                self.record_violation(method, session, &reason);
                Err(GatewayError::PermissionDenied { allowed_roles })
            }
            Err(err) => {
                warn!("{} failed: {}", method, err);
                Err(GatewayError::ExecutionError {
                    message: err.to_string(),
                })
            }
        }
    }

    /// Awaits a call into a handler until `deadline`. A panic inside the
    /// handler becomes an execution error for this request only.
    async fn guarded<T>(
        &self,
        resolved: &ResolvedCommand,
        method: &str,
        deadline: tokio::time::Instant,
        call: impl Future<Output = T>,
    ) -> Result<T, GatewayError> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout_at(deadline, AssertUnwindSafe(call).catch_unwind()).await {
            Err(_) => {
                warn!("{} timed out after {:?}", method, timeout);
                Err(GatewayError::Timeout {
                    after_ms: timeout.as_millis() as u64,
                })
            }
            Ok(Err(panic)) => {
                error!(
                    "Handler {} panicked on {}: {}",
                    resolved.handler.namespace(),
                    method,
                    panic_message(panic.as_ref())
                );
                Err(GatewayError::ExecutionError {
                    message: "handler panicked".to_string(),
                })
            }
            Ok(Ok(value)) => Ok(value),
        }
    }

    async fn session_command(
        &self,
        method: &str,
        params: Value,
        session: &Session,
    ) -> Result<Value, GatewayError> {
        match method {
            methods::AUTHENTICATE => self.authenticate(params, session).await,
            methods::LOGOUT => {
                let user = session.logout();
                self.broker
                    .set_viewer(session.id(), EvaluationContext::default())
                    .await;
                if let Some(user) = &user {
                    info!("User {} logged out of {}", user.id, session.id());
                }
                Ok(json!({ "loggedOut": user.is_some() }))
            }
            other => Err(GatewayError::UnknownMethod(other.to_string())),
        }
    }

    async fn authenticate(&self, params: Value, session: &Session) -> Result<Value, GatewayError> {
        let credentials: Credentials = serde_json::from_value(params).map_err(|_| {
            GatewayError::InvalidRequest(
                "expected {email, password} or {token} credentials".to_string(),
            )
        })?;
        session
            .begin_authentication()
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        match self.user_store.authenticate(&credentials).await {
            Ok(user) => {
                info!(
                    "Session {} authenticated as {} ({})",
                    session.id(),
                    user.id,
                    user.role
                );
                let available = self.registry.available_commands(user.role);
                session.finish_authentication(Some(user.clone()));
                self.broker
                    .set_viewer(session.id(), user.evaluation_context())
                    .await;
                Ok(json!({
                    "authenticated": true,
                    "user": user,
                    "availableCommands": available,
                }))
            }
            Err(AuthError::InvalidCredentials) => {
                session.finish_authentication(None);
                self.event_log.record(
                    SecurityEvent::new(
                        SecurityEventType::AuthFailure,
                        RiskLevel::Medium,
                        "Authentication failed",
                    )
                    .with_session(session.id())
                    .with_context(json!({
                        "principal": credentials.principal(),
                        "peer": session.peer().map(|addr| addr.ip().to_string()),
                    })),
                );
                Err(GatewayError::Unauthenticated)
            }
            Err(err @ AuthError::Unavailable(_)) => {
                session.finish_authentication(None);
                error!("Authentication backend failure: {}", err);
                Err(GatewayError::ExecutionError {
                    message: err.to_string(),
                })
            }
        }
    }
}

fn redact_credentials(params: &Value) -> Value {
    match params {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !CREDENTIAL_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

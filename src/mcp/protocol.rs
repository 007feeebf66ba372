//! Gateway Protocol Types
//!
//! JSON envelopes exchanged over the gateway connection, plus the typed error
//! taxonomy and its mapping onto wire error codes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::user::UserRole;

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Core Message Types
// ============================================================================

/// Request id can be string or number. Opaque to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::String(s) => f.write_str(s),
            RequestId::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Incoming request envelope as received on the wire. Every field is
/// optional here so a missing `id` or `method` can still be answered.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRequest {
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// A request that passed envelope validation.
#[derive(Debug, Clone, PartialEq)]
pub struct McpRequest {
    pub id: RequestId,
    pub method: String,
    /// Always a JSON object.
    pub params: Value,
    pub timestamp: Option<i64>,
}

impl McpRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
            timestamp: Some(now_millis()),
        }
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId::String(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        RequestId::String(value)
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

impl TryFrom<RawRequest> for McpRequest {
    type Error = (Option<RequestId>, GatewayError);

    fn try_from(raw: RawRequest) -> Result<Self, Self::Error> {
        let Some(id) = raw.id else {
            return Err((None, GatewayError::InvalidRequest("missing id".to_string())));
        };
        let method = match raw.method {
            Some(method) if !method.trim().is_empty() => method,
            _ => {
                return Err((
                    Some(id),
                    GatewayError::InvalidRequest("missing method".to_string()),
                ))
            }
        };
        let params = match raw.params {
            None | Some(Value::Null) => json!({}),
            Some(params @ Value::Object(_)) => params,
            Some(_) => {
                return Err((
                    Some(id),
                    GatewayError::InvalidRequest("params must be an object".to_string()),
                ))
            }
        };
        Ok(McpRequest {
            id,
            method,
            params,
            timestamp: raw.timestamp,
        })
    }
}

/// Decodes one text frame into a validated request.
pub fn decode_request(text: &str) -> Result<McpRequest, (Option<RequestId>, GatewayError)> {
    let raw: RawRequest = serde_json::from_str(text)
        .map_err(|e| (None, GatewayError::InvalidRequest(format!("malformed JSON: {}", e))))?;
    McpRequest::try_from(raw)
}

/// Response to a gateway client. Exactly one of `result`/`error` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpResponse {
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpErrorResponse>,
    pub timestamp: i64,
}

impl McpResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
            timestamp: now_millis(),
        }
    }

    pub fn error(id: Option<RequestId>, error: GatewayError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.into()),
            timestamp: now_millis(),
        }
    }

    pub fn error_code(&self) -> Option<u16> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McpErrorResponse {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Server-initiated notification for a subscribed topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerEvent {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub topic: String,
    pub payload: Value,
    pub timestamp: i64,
}

impl ServerEvent {
    pub const TYPE: &'static str = "event";

    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            msg_type: Self::TYPE.to_string(),
            topic: topic.into(),
            payload,
            timestamp: now_millis(),
        }
    }
}

/// Anything the connection writer puts on the wire.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum OutgoingMessage {
    Response(McpResponse),
    Event(ServerEvent),
}

// ============================================================================
// Error Codes
// ============================================================================

pub mod codes {
    pub const INVALID_REQUEST: u16 = 400;
    pub const NOT_AUTHENTICATED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const RATE_LIMITED: u16 = 429;
    pub const EXECUTION_ERROR: u16 = 500;
    pub const UNKNOWN_METHOD: u16 = 501;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Insufficient permissions for this command")]
    PermissionDenied { allowed_roles: Vec<UserRole> },

    // Deliberately vague: the matched rule is never reported back.
    #[error("Request blocked by security policy")]
    SecurityViolation,

    #[error("Rate limit exceeded")]
    RateLimited { reset_time: i64 },

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Command execution failed")]
    ExecutionError { message: String },

    #[error("Command timed out")]
    Timeout { after_ms: u64 },
}

impl GatewayError {
    pub fn code(&self) -> u16 {
        match self {
            GatewayError::InvalidRequest(_) => codes::INVALID_REQUEST,
            GatewayError::Unauthenticated => codes::NOT_AUTHENTICATED,
            GatewayError::PermissionDenied { .. } | GatewayError::SecurityViolation => {
                codes::FORBIDDEN
            }
            GatewayError::RateLimited { .. } => codes::RATE_LIMITED,
            GatewayError::UnknownMethod(_) => codes::UNKNOWN_METHOD,
            GatewayError::ExecutionError { .. } | GatewayError::Timeout { .. } => {
                codes::EXECUTION_ERROR
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "INVALID_REQUEST",
            GatewayError::Unauthenticated => "NOT_AUTHENTICATED",
            GatewayError::PermissionDenied { .. } => "PERMISSION_DENIED",
            GatewayError::SecurityViolation => "SECURITY_VIOLATION",
            GatewayError::RateLimited { .. } => "RATE_LIMITED",
            GatewayError::UnknownMethod(_) => "UNKNOWN_METHOD",
            GatewayError::ExecutionError { .. } | GatewayError::Timeout { .. } => {
                "EXECUTION_ERROR"
            }
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            GatewayError::PermissionDenied { allowed_roles } => {
                let required = allowed_roles.iter().min().copied();
                Some(json!({
                    "requiredRole": required.map(UserRole::as_str),
                    "allowedRoles": allowed_roles.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
                }))
            }
            GatewayError::RateLimited { reset_time } => Some(json!({ "resetTime": reset_time })),
            GatewayError::UnknownMethod(method) => Some(json!({ "method": method })),
            GatewayError::ExecutionError { message } => Some(json!({ "error": message })),
            GatewayError::Timeout { after_ms } => Some(json!({
                "error": format!("request timed out after {} ms", after_ms),
                "timeoutMs": after_ms,
            })),
            _ => None,
        }
    }
}

impl From<GatewayError> for McpErrorResponse {
    fn from(err: GatewayError) -> Self {
        McpErrorResponse {
            code: err.code(),
            message: format!("{}: {}", err.kind(), err),
            details: err.details(),
        }
    }
}

// ============================================================================
// Built-in Method Names
// ============================================================================

pub mod methods {
    // Session
    pub const AUTHENTICATE: &str = "authenticate";
    pub const LOGOUT: &str = "logout";

    // Liveness
    pub const PING: &str = "ping";
    pub const HEALTH: &str = "health";

    // Topics
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";

    // Security administration
    pub const SECURITY_EVENTS: &str = "security_events";
    pub const SECURITY_POLICIES: &str = "security_policies";
    pub const SECURITY_LOG_INCIDENT: &str = "security_log_incident";
}

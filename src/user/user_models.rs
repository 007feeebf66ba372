use serde::{Deserialize, Serialize};

use super::permissions::{EvaluationContext, UserRole};

/// Identity attached to a connection after a successful authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub id: String,
    pub email: String,
    pub role: UserRole,
    pub tenant_id: Option<String>,
}

impl UserContext {
    /// Evaluation context carrying only the caller's identity; resource
    /// facts are filled in per request.
    pub fn evaluation_context(&self) -> EvaluationContext {
        EvaluationContext {
            user_id: Some(self.id.clone()),
            user_role: self.role,
            tenant_id: self.tenant_id.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Credentials {
    Password { email: String, password: String },
    ApiToken { token: String },
}

impl Credentials {
    /// Identifier safe to put in logs and security events.
    pub fn principal(&self) -> String {
        match self {
            Credentials::Password { email, .. } => email.clone(),
            Credentials::ApiToken { token } => {
                let visible: String = token.chars().take(4).collect();
                format!("token:{}…", visible)
            }
        }
    }
}

/// A user known to the in-memory store.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
}

impl UserRecord {
    pub fn context(&self) -> UserContext {
        UserContext {
            id: self.id.clone(),
            email: self.email.clone(),
            role: self.role,
            tenant_id: self.tenant_id.clone(),
        }
    }
}

//! Command Execution Context
//!
//! Provides handlers with the caller's identity, the evaluated permission
//! context and access to the topic broker.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::pubsub::TopicBroker;
use crate::user::policy::resource_policy;
use crate::user::{EvaluationContext, UserContext, UserRole};

/// Context passed to command handlers
#[derive(Clone)]
pub struct CommandContext {
    pub session_id: String,
    pub user: Option<UserContext>,
    pub evaluation: EvaluationContext,
    pub broker: Arc<TopicBroker>,
}

impl CommandContext {
    pub fn role(&self) -> UserRole {
        self.evaluation.user_role
    }

    pub fn user_id(&self) -> Option<&str> {
        self.evaluation.user_id.as_deref()
    }

    /// Whether records of `tenant` are visible to the caller.
    pub fn sees_tenant(&self, tenant: &str) -> bool {
        self.role() == UserRole::Admin
            || self
                .evaluation
                .tenant_id
                .as_deref()
                .map_or(true, |own| own == tenant)
    }

    /// Publishes a change notification to the subscribers of `topic` that
    /// may read the record described by `facts`.
    pub async fn publish(&self, topic: &str, payload: Value, facts: ResourceFacts) {
        self.broker.publish(topic, payload, facts).await;
    }
}

/// Facts about the resource targeted by a request, merged into the
/// [`EvaluationContext`] before conditional permissions are checked.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceFacts {
    #[serde(rename = "resourceOwnerId")]
    pub owner_id: Option<String>,
    #[serde(rename = "resourceTenantId")]
    pub tenant_id: Option<String>,
    #[serde(alias = "barberId")]
    pub assigned_to: Option<String>,
    pub appointment_staff_ids: Vec<String>,
    #[serde(rename = "includeSensitive")]
    pub includes_sensitive: bool,
}

impl ResourceFacts {
    /// Facts supplied explicitly by the caller in the request params.
    /// Unparseable values are ignored, leaving the fact unknown.
    pub fn from_params(params: &Value) -> Self {
        serde_json::from_value(params.clone()).unwrap_or_default()
    }

    /// Facts read from a stored record, using the resource policy to locate
    /// its owner and tenant fields.
    pub fn from_record(resource: &str, record: &Value) -> Self {
        let field = |name: Option<&'static str>| {
            name.and_then(|name| record.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        match resource_policy(resource) {
            Some(policy) => Self {
                owner_id: field(policy.owner_field),
                tenant_id: field(policy.tenant_field),
                ..Default::default()
            },
            None => Self::default(),
        }
    }

    pub fn assigned_to(mut self, staff_id: impl Into<String>) -> Self {
        let staff_id = staff_id.into();
        self.appointment_staff_ids.push(staff_id.clone());
        self.assigned_to = Some(staff_id);
        self
    }

    pub fn with_staff(mut self, staff_ids: impl IntoIterator<Item = String>) -> Self {
        self.appointment_staff_ids.extend(staff_ids);
        self
    }

    pub fn sensitive(mut self, includes_sensitive: bool) -> Self {
        self.includes_sensitive = includes_sensitive;
        self
    }

    pub fn apply(self, ctx: &mut EvaluationContext) {
        ctx.resource_owner_id = self.owner_id;
        ctx.resource_tenant_id = self.tenant_id;
        ctx.assigned_to = self.assigned_to;
        ctx.appointment_staff_ids = self.appointment_staff_ids;
        ctx.includes_sensitive = self.includes_sensitive;
    }
}

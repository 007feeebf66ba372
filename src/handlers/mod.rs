//! Sample business handlers over the in-memory [`SalonStore`].

mod ai;
mod analytics;
mod app;
mod business;
mod content;
pub mod store;
mod system;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::mcp::pubsub::topic_resource;
use crate::mcp::registry::{Handler, HandlerError};
use crate::mcp::{CommandContext, ResourceFacts};
use crate::security::SecurityEventLog;

pub use ai::AiHandler;
pub use analytics::AnalyticsHandler;
pub use app::AppHandler;
pub use business::BusinessHandler;
pub use content::ContentHandler;
pub use store::{SalonStore, StoreError, DEMO_TENANT};
pub use system::SystemHandler;

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => HandlerError::NotFound(format!("{} {}", kind, id)),
            StoreError::Conflict(message) => HandlerError::Failed(message),
            StoreError::Invalid(message) => HandlerError::InvalidParams(message),
        }
    }
}

/// Every sample handler, sharing one store.
pub fn default_handlers(
    store: Arc<SalonStore>,
    event_log: Arc<SecurityEventLog>,
) -> Vec<Arc<dyn Handler>> {
    vec![
        Arc::new(AppHandler::new(store.clone())),
        Arc::new(BusinessHandler::new(store.clone())),
        Arc::new(ContentHandler::new(store.clone())),
        Arc::new(AnalyticsHandler::new(store.clone())),
        Arc::new(AiHandler::new(store.clone())),
        Arc::new(SystemHandler::new(store, event_log)),
    ]
}

#[derive(Debug, Deserialize)]
struct IdParams {
    id: String,
}

/// Params of an update command: the target id plus the changed fields.
#[derive(Debug, Deserialize)]
struct WithId<T> {
    id: String,
    #[serde(flatten)]
    fields: T,
}

fn id_param(params: &Value, key: &str) -> Option<String> {
    params.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Tenant new records are created in.
fn caller_tenant(ctx: &CommandContext) -> &str {
    ctx.evaluation.tenant_id.as_deref().unwrap_or(DEMO_TENANT)
}

/// Facts of a stored record as permission checks see them: owner and tenant
/// from the resource policy, plus the staff attached to it.
fn record_facts(store: &SalonStore, resource: &str, record: &Value) -> ResourceFacts {
    let facts = ResourceFacts::from_record(resource, record);
    match resource {
        "appointments" => match record.get("barber").and_then(Value::as_str) {
            Some(barber) => facts.assigned_to(barber),
            None => facts,
        },
        "customers" => match record.get("id").and_then(Value::as_str) {
            Some(id) => facts.with_staff(store.barbers_for_customer(id)),
            None => facts,
        },
        _ => facts,
    }
}

/// Tells the subscribers of `topic` that may read `record` that it changed.
async fn notify(
    ctx: &CommandContext,
    store: &SalonStore,
    topic: &str,
    action: &str,
    record: &impl serde::Serialize,
) {
    let record = match serde_json::to_value(record) {
        Ok(record) => record,
        Err(e) => {
            warn!("Failed to serialize {} event: {}", topic, e);
            return;
        }
    };
    let facts = topic_resource(topic)
        .map(|resource| record_facts(store, resource, &record))
        .unwrap_or_default();
    ctx.publish(topic, json!({ "action": action, "record": record }), facts)
        .await;
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::HandlerRegistry;

    #[test]
    fn default_handlers_register_without_clashes() {
        let mut registry = HandlerRegistry::new();
        for handler in default_handlers(
            Arc::new(SalonStore::new()),
            Arc::new(SecurityEventLog::default()),
        ) {
            registry.register(handler).unwrap();
        }
        assert_eq!(registry.handler_count(), 6);
        assert!(registry.resolve("appointments_book").is_some());
        assert!(registry.resolve("system_backup").is_some());
    }

    #[test]
    fn store_errors_map_to_handler_errors() {
        let err: HandlerError = StoreError::Invalid("bad".to_string()).into();
        assert!(matches!(err, HandlerError::InvalidParams(_)));
        let err: HandlerError = StoreError::NotFound {
            kind: "customer",
            id: "c9".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "customer c9 not found");
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::store::{SalonStore, AUDIT_LOG_CAPACITY, DEMO_TENANT};
use crate::mcp::registry::{
    parse_params, roles, CommandScope, CommandSpec, Handler, HandlerError, HandlerResult,
};
use crate::mcp::CommandContext;
use crate::security::SecurityEventLog;

const fn system(
    method: &'static str,
    action: &'static str,
    description: &'static str,
) -> CommandSpec {
    CommandSpec::new(
        method,
        "system",
        action,
        roles::ADMIN_ONLY,
        CommandScope::Collection,
        description,
    )
}

const SYSTEM_COMMANDS: &[CommandSpec] = &[
    system("system_config", "read", "Runtime settings of the sample backend"),
    system("system_logs", "read", "Recent audit entries and security events"),
    system("system_backup", "backup", "Snapshot of every stored record"),
];

const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LogParams {
    limit: Option<usize>,
}

pub struct SystemHandler {
    store: Arc<SalonStore>,
    event_log: Arc<SecurityEventLog>,
}

impl SystemHandler {
    pub fn new(store: Arc<SalonStore>, event_log: Arc<SecurityEventLog>) -> Self {
        Self { store, event_log }
    }

    fn backup(&self, ctx: &CommandContext) -> HandlerResult {
        let users = self.store.list_users();
        let customers = self.store.list_customers();
        let appointments = self.store.list_appointments();
        let services = self.store.list_services();
        let pages = self.store.list_pages();
        let payments = self.store.list_payments();

        self.store.audit(ctx.user_id(), "system_backup", "store");
        Ok(json!({
            "createdAt": Utc::now().to_rfc3339(),
            "counts": {
                "users": users.len(),
                "customers": customers.len(),
                "appointments": appointments.len(),
                "services": services.len(),
                "pages": pages.len(),
                "payments": payments.len(),
            },
            "snapshot": {
                "users": users,
                "customers": customers,
                "appointments": appointments,
                "services": services,
                "pages": pages,
                "payments": payments,
            },
        }))
    }
}

#[async_trait]
impl Handler for SystemHandler {
    fn namespace(&self) -> &'static str {
        "system"
    }

    fn commands(&self) -> &'static [CommandSpec] {
        SYSTEM_COMMANDS
    }

    async fn execute(&self, method: &str, params: Value, ctx: &CommandContext) -> HandlerResult {
        match method {
            "system_config" => Ok(json!({
                "version": format!("{}-{}", env!("APP_VERSION"), env!("GIT_HASH")),
                "defaultTenant": DEMO_TENANT,
                "auditLogCapacity": AUDIT_LOG_CAPACITY,
                "eventLog": {
                    "capacity": self.event_log.capacity(),
                    "stored": self.event_log.len(),
                },
            })),
            "system_logs" => {
                let params: LogParams = if params.is_null() {
                    LogParams::default()
                } else {
                    parse_params(params)?
                };
                let limit = params.limit.unwrap_or(DEFAULT_LOG_LIMIT);
                Ok(json!({
                    "audit": self.store.audit_entries(limit),
                    "securityEvents": self.event_log.recent(limit, None),
                }))
            }
            "system_backup" => self.backup(ctx),
            other => Err(HandlerError::Failed(format!(
                "system handler cannot execute {}",
                other
            ))),
        }
    }
}

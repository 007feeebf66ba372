//! Test data: accounts and a handler with deliberately misbehaving commands.

use super::constants::*;
use async_trait::async_trait;
use salon_mcp_gateway::mcp::registry::{roles, HandlerResult};
use salon_mcp_gateway::mcp::{CommandContext, CommandScope, CommandSpec, Handler, HandlerError};
use salon_mcp_gateway::user::{UserRecord, UserRole};
use serde_json::Value;
use std::time::Duration;

/// Accounts matching the users seeded in the sample store.
pub fn test_users() -> Vec<UserRecord> {
    [
        (CUSTOMER_ID, CUSTOMER_EMAIL, UserRole::Customer, None),
        (OTHER_CUSTOMER_ID, OTHER_CUSTOMER_EMAIL, UserRole::Customer, None),
        (BARBER_ID, BARBER_EMAIL, UserRole::Barber, None),
        (MANAGER_ID, MANAGER_EMAIL, UserRole::Manager, None),
        (ADMIN_ID, ADMIN_EMAIL, UserRole::Admin, Some(ADMIN_TOKEN)),
    ]
    .into_iter()
    .map(|(id, email, role, token)| UserRecord {
        id: id.to_string(),
        email: email.to_string(),
        password: TEST_PASS.to_string(),
        role,
        tenant_id: Some("salon-1".to_string()),
        api_token: token.map(str::to_string),
    })
    .collect()
}

const FIXTURE_COMMANDS: &[CommandSpec] = &[
    CommandSpec::new(
        FAILING_METHOD,
        "services",
        "read",
        roles::EVERYONE,
        CommandScope::Collection,
        "Always fails",
    ),
    CommandSpec::new(
        SLOW_METHOD,
        "services",
        "read",
        roles::EVERYONE,
        CommandScope::Collection,
        "Never finishes in time",
    ),
];

pub struct FixtureHandler;

#[async_trait]
impl Handler for FixtureHandler {
    fn namespace(&self) -> &'static str {
        "fixture"
    }

    fn commands(&self) -> &'static [CommandSpec] {
        FIXTURE_COMMANDS
    }

    async fn execute(&self, method: &str, _params: Value, _ctx: &CommandContext) -> HandlerResult {
        match method {
            FAILING_METHOD => Err(HandlerError::Failed(FIXTURE_FAILURE_MESSAGE.to_string())),
            SLOW_METHOD => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Value::Null)
            }
            other => Err(HandlerError::Failed(format!("unexpected {}", other))),
        }
    }
}

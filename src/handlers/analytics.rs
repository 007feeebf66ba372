use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::store::{AppointmentStatus, SalonStore};
use crate::mcp::registry::{roles, CommandScope, CommandSpec, Handler, HandlerError, HandlerResult};
use crate::mcp::CommandContext;

const fn analytics(method: &'static str, description: &'static str) -> CommandSpec {
    CommandSpec::new(
        method,
        "analytics",
        "read",
        roles::MANAGEMENT,
        CommandScope::Collection,
        description,
    )
}

const ANALYTICS_COMMANDS: &[CommandSpec] = &[
    analytics("analytics_dashboard", "Headline numbers for the salon"),
    analytics("analytics_users", "Accounts by role"),
    analytics("analytics_appointments", "Appointments by status and barber"),
    analytics("analytics_revenue", "Payments received"),
];

pub struct AnalyticsHandler {
    store: Arc<SalonStore>,
}

impl AnalyticsHandler {
    pub fn new(store: Arc<SalonStore>) -> Self {
        Self { store }
    }

    fn users(&self, ctx: &CommandContext) -> Value {
        let mut by_role: BTreeMap<&str, usize> = BTreeMap::new();
        let users = self.store.list_users();
        let visible: Vec<_> = users.iter().filter(|u| ctx.sees_tenant(&u.tenant)).collect();
        for user in &visible {
            *by_role.entry(user.role.as_str()).or_default() += 1;
        }
        json!({
            "total": visible.len(),
            "active": visible.iter().filter(|u| u.active).count(),
            "byRole": by_role,
        })
    }

    fn appointments(&self, ctx: &CommandContext) -> Value {
        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_barber: BTreeMap<String, usize> = BTreeMap::new();
        let appointments: Vec<_> = self
            .store
            .list_appointments()
            .into_iter()
            .filter(|a| ctx.sees_tenant(&a.tenant))
            .collect();
        for appointment in &appointments {
            let status = serde_json::to_value(appointment.status)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            *by_status.entry(status).or_default() += 1;
            *by_barber.entry(appointment.barber.clone()).or_default() += 1;
        }
        let cancelled = appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Cancelled)
            .count();
        let cancellation_rate = if appointments.is_empty() {
            0.0
        } else {
            cancelled as f64 / appointments.len() as f64
        };
        json!({
            "total": appointments.len(),
            "byStatus": by_status,
            "byBarber": by_barber,
            "cancellationRate": cancellation_rate,
        })
    }

    fn revenue(&self, ctx: &CommandContext) -> Value {
        let payments: Vec<_> = self
            .store
            .list_payments()
            .into_iter()
            .filter(|p| ctx.sees_tenant(&p.tenant))
            .collect();
        let mut by_method: BTreeMap<String, u64> = BTreeMap::new();
        for payment in &payments {
            *by_method.entry(payment.method.clone()).or_default() += payment.amount_cents as u64;
        }
        let total: u64 = by_method.values().sum();
        json!({
            "payments": payments.len(),
            "totalCents": total,
            "byMethod": by_method,
        })
    }
}

#[async_trait]
impl Handler for AnalyticsHandler {
    fn namespace(&self) -> &'static str {
        "analytics"
    }

    fn commands(&self) -> &'static [CommandSpec] {
        ANALYTICS_COMMANDS
    }

    async fn execute(&self, method: &str, _params: Value, ctx: &CommandContext) -> HandlerResult {
        match method {
            "analytics_dashboard" => Ok(json!({
                "users": self.users(ctx),
                "appointments": self.appointments(ctx),
                "revenue": self.revenue(ctx),
            })),
            "analytics_users" => Ok(self.users(ctx)),
            "analytics_appointments" => Ok(self.appointments(ctx)),
            "analytics_revenue" => Ok(self.revenue(ctx)),
            other => Err(HandlerError::Failed(format!(
                "analytics handler cannot execute {}",
                other
            ))),
        }
    }
}

//! Payments, loyalty points and invoices.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::store::SalonStore;
use super::{id_param, notify};
use crate::mcp::registry::{
    parse_params, roles, to_result, CommandScope, CommandSpec, Handler, HandlerError,
    HandlerResult,
};
use crate::mcp::{CommandContext, ResourceFacts};

const BUSINESS_COMMANDS: &[CommandSpec] = &[
    CommandSpec::new(
        "business_process_payment",
        "payments",
        "process",
        roles::MANAGEMENT,
        CommandScope::Collection,
        "Record a payment for an appointment",
    ),
    CommandSpec::new(
        "business_add_loyalty_points",
        "customers",
        "update",
        roles::MANAGEMENT,
        CommandScope::Instance,
        "Credit loyalty points to a customer",
    ),
    CommandSpec::new(
        "business_generate_invoice",
        "payments",
        "read",
        roles::MANAGEMENT,
        CommandScope::Collection,
        "Invoice for an appointment",
    ),
];

const PAYMENT_METHODS: &[&str] = &["card", "cash", "voucher"];
/// Points credited per whole currency unit paid.
const POINTS_PER_UNIT: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentParams {
    appointment_id: String,
    amount_cents: u32,
    method: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoyaltyParams {
    customer_id: String,
    points: u32,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceParams {
    appointment_id: String,
}

pub struct BusinessHandler {
    store: Arc<SalonStore>,
}

impl BusinessHandler {
    pub fn new(store: Arc<SalonStore>) -> Self {
        Self { store }
    }

    async fn process_payment(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let params: PaymentParams = parse_params(params)?;
        if !PAYMENT_METHODS.contains(&params.method.as_str()) {
            return Err(HandlerError::InvalidParams(format!(
                "unsupported payment method {}",
                params.method
            )));
        }
        let appointment = self
            .store
            .get_appointment(&params.appointment_id)
            .filter(|a| ctx.sees_tenant(&a.tenant))
            .ok_or_else(|| {
                HandlerError::NotFound(format!("appointment {}", params.appointment_id))
            })?;

        let payment = self.store.record_payment(
            &appointment.id,
            params.amount_cents,
            &params.method,
            ctx.user_id().map(str::to_string),
        )?;
        let earned = params.amount_cents / 100 * POINTS_PER_UNIT;
        let customer = self.store.add_loyalty_points(&appointment.customer, earned)?;

        self.store
            .audit(ctx.user_id(), "business_process_payment", &payment.id);
        notify(ctx, &self.store, "orders", "paid", &payment).await;
        Ok(json!({
            "payment": payment,
            "pointsEarned": earned,
            "loyaltyPoints": customer.loyalty_points,
        }))
    }

    async fn add_loyalty_points(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let params: LoyaltyParams = parse_params(params)?;
        if params.points == 0 {
            return Err(HandlerError::InvalidParams("points must be positive".to_string()));
        }
        let customer = self
            .store
            .add_loyalty_points(&params.customer_id, params.points)?;
        let target = match &params.reason {
            Some(reason) => format!("{} ({})", customer.id, reason),
            None => customer.id.clone(),
        };
        self.store
            .audit(ctx.user_id(), "business_add_loyalty_points", &target);
        notify(ctx, &self.store, "customers", "updated", &customer).await;
        to_result(&customer)
    }

    fn generate_invoice(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let InvoiceParams { appointment_id } = parse_params(params)?;
        let appointment = self
            .store
            .get_appointment(&appointment_id)
            .filter(|a| ctx.sees_tenant(&a.tenant))
            .ok_or_else(|| HandlerError::NotFound(format!("appointment {}", appointment_id)))?;
        let service = self
            .store
            .get_service(&appointment.service)
            .ok_or_else(|| HandlerError::NotFound(format!("service {}", appointment.service)))?;
        let payments = self.store.payments_for(&appointment.id);
        let paid: u32 = payments.iter().map(|p| p.amount_cents).sum();

        Ok(json!({
            "invoiceNumber": format!("INV-{}", appointment.id),
            "appointment": appointment.id,
            "customer": appointment.customer,
            "lines": [{
                "description": service.name,
                "amountCents": service.price_cents,
            }],
            "totalCents": service.price_cents,
            "paidCents": paid,
            "balanceCents": service.price_cents.saturating_sub(paid),
            "payments": payments,
        }))
    }
}

#[async_trait]
impl Handler for BusinessHandler {
    fn namespace(&self) -> &'static str {
        "business"
    }

    fn commands(&self) -> &'static [CommandSpec] {
        BUSINESS_COMMANDS
    }

    async fn resource_facts(&self, method: &str, params: &Value) -> ResourceFacts {
        match method {
            "business_add_loyalty_points" => id_param(params, "customerId")
                .and_then(|id| self.store.get_customer(&id))
                .and_then(|customer| serde_json::to_value(customer).ok())
                .map(|record| ResourceFacts::from_record("customers", &record))
                .unwrap_or_default(),
            _ => ResourceFacts::default(),
        }
    }

    async fn execute(&self, method: &str, params: Value, ctx: &CommandContext) -> HandlerResult {
        match method {
            "business_process_payment" => self.process_payment(params, ctx).await,
            "business_add_loyalty_points" => self.add_loyalty_points(params, ctx).await,
            "business_generate_invoice" => self.generate_invoice(params, ctx),
            other => Err(HandlerError::Failed(format!(
                "business handler cannot execute {}",
                other
            ))),
        }
    }
}

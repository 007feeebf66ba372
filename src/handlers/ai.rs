//! Rule-based stand-ins for the assistant features: style suggestions from
//! the service menu and a no-show risk estimate from booking history.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::id_param;
use super::store::{parse_timestamp, AppointmentStatus, SalonStore};
use crate::mcp::registry::{
    parse_params, roles, CommandScope, CommandSpec, Handler, HandlerError, HandlerResult,
};
use crate::mcp::{CommandContext, ResourceFacts};

const AI_COMMANDS: &[CommandSpec] = &[
    CommandSpec::new(
        "ai_style_consultation",
        "services",
        "read",
        roles::SIGNED_IN,
        CommandScope::Collection,
        "Suggest services for a described style",
    ),
    CommandSpec::new(
        "ai_predict_no_show",
        "appointments",
        "read",
        roles::MANAGEMENT,
        CommandScope::Instance,
        "Estimate the no-show risk of an appointment",
    ),
];

const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsultationParams {
    description: String,
    #[serde(default)]
    max_price_cents: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoShowParams {
    appointment_id: String,
}

pub struct AiHandler {
    store: Arc<SalonStore>,
}

impl AiHandler {
    pub fn new(store: Arc<SalonStore>) -> Self {
        Self { store }
    }

    fn style_consultation(&self, params: Value, ctx: &CommandContext) -> HandlerResult {
        let params: ConsultationParams = parse_params(params)?;
        let words: Vec<String> = params
            .description
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
            .map(str::to_lowercase)
            .collect();
        if words.is_empty() {
            return Err(HandlerError::InvalidParams(
                "description must name what you are looking for".to_string(),
            ));
        }

        let mut scored: Vec<_> = self
            .store
            .list_services()
            .into_iter()
            .filter(|s| s.active && ctx.sees_tenant(&s.tenant))
            .filter(|s| params.max_price_cents.map_or(true, |max| s.price_cents <= max))
            .map(|s| {
                let haystack = format!("{} {}", s.name, s.category).to_lowercase();
                let score = words.iter().filter(|w| haystack.contains(w.as_str())).count();
                (score, s)
            })
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.price_cents.cmp(&b.1.price_cents)));

        let suggestions: Vec<_> = scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(score, s)| {
                json!({
                    "serviceId": s.id,
                    "name": s.name,
                    "priceCents": s.price_cents,
                    "durationMinutes": s.duration_minutes,
                    "matchScore": score,
                })
            })
            .collect();
        Ok(json!({ "suggestions": suggestions }))
    }

    fn predict_no_show(&self, params: Value) -> HandlerResult {
        let NoShowParams { appointment_id } = parse_params(params)?;
        let appointment = self
            .store
            .get_appointment(&appointment_id)
            .ok_or_else(|| HandlerError::NotFound(format!("appointment {}", appointment_id)))?;

        let history: Vec<_> = self
            .store
            .list_appointments()
            .into_iter()
            .filter(|a| a.customer == appointment.customer && a.id != appointment.id)
            .collect();
        let missed = history
            .iter()
            .filter(|a| {
                matches!(
                    a.status,
                    AppointmentStatus::NoShow | AppointmentStatus::Cancelled
                )
            })
            .count();

        let mut factors = Vec::new();
        // Percent, to keep the level thresholds exact.
        let mut risk: u32 = 10;
        if history.is_empty() {
            risk += 15;
            factors.push("first visit");
        } else if missed > 0 {
            risk += (50 * missed / history.len()) as u32;
            factors.push("missed or cancelled before");
        }
        let starts_at = parse_timestamp(&appointment.starts_at)?;
        if (starts_at - Utc::now()).num_days() > 14 {
            risk += 10;
            factors.push("booked far ahead");
        }
        let risk = risk.min(95);

        Ok(json!({
            "appointmentId": appointment.id,
            "risk": risk as f64 / 100.0,
            "level": match risk {
                50.. => "high",
                25.. => "medium",
                _ => "low",
            },
            "factors": factors,
        }))
    }
}

#[async_trait]
impl Handler for AiHandler {
    fn namespace(&self) -> &'static str {
        "ai"
    }

    fn commands(&self) -> &'static [CommandSpec] {
        AI_COMMANDS
    }

    async fn resource_facts(&self, method: &str, params: &Value) -> ResourceFacts {
        if method != "ai_predict_no_show" {
            return ResourceFacts::default();
        }
        id_param(params, "appointmentId")
            .and_then(|id| self.store.get_appointment(&id))
            .map(|appointment| {
                let barber = appointment.barber.clone();
                serde_json::to_value(&appointment)
                    .map(|record| ResourceFacts::from_record("appointments", &record))
                    .unwrap_or_default()
                    .assigned_to(barber)
            })
            .unwrap_or_default()
    }

    async fn execute(&self, method: &str, params: Value, ctx: &CommandContext) -> HandlerResult {
        match method {
            "ai_style_consultation" => self.style_consultation(params, ctx),
            "ai_predict_no_show" => self.predict_no_show(params),
            other => Err(HandlerError::Failed(format!("ai handler cannot execute {}", other))),
        }
    }
}

//! Bounded in-memory log of security decisions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::alert::{AlertSink, TracingAlertSink};
use super::classifier::RiskLevel;
use crate::server::metrics::record_security_event;

pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 1000;
pub const DEFAULT_RECENT_LIMIT: usize = 50;
const RECENT_WINDOW_MS: i64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    JailbreakAttempt,
    SuspiciousActivity,
    AuthFailure,
    PermissionViolation,
}

impl SecurityEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityEventType::JailbreakAttempt => "jailbreak_attempt",
            SecurityEventType::SuspiciousActivity => "suspicious_activity",
            SecurityEventType::AuthFailure => "auth_failure",
            SecurityEventType::PermissionViolation => "permission_violation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: SecurityEventType,
    pub risk: RiskLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub context: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, risk: RiskLevel, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            risk,
            message: message.into(),
            user_id: None,
            session_id: None,
            context: Value::Null,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityMetrics {
    pub total_events: usize,
    pub high_risk_events: usize,
    pub recent_events: usize,
}

pub struct SecurityEventLog {
    capacity: usize,
    events: Mutex<VecDeque<SecurityEvent>>,
    alert_sink: Arc<dyn AlertSink>,
}

impl Default for SecurityEventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LOG_CAPACITY, Arc::new(TracingAlertSink))
    }
}

impl SecurityEventLog {
    pub fn new(capacity: usize, alert_sink: Arc<dyn AlertSink>) -> Self {
        Self {
            capacity: capacity.max(1),
            events: Mutex::new(VecDeque::new()),
            alert_sink,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends an event. Once the log grows past its capacity the oldest half
    /// is dropped in one go.
    pub fn record(&self, event: SecurityEvent) {
        info!(
            event_type = event.event_type.as_str(),
            risk = event.risk.as_str(),
            "Security event: {}",
            event.message
        );
        record_security_event(event.event_type.as_str(), event.risk.as_str());

        let alert = (event.risk == RiskLevel::High).then(|| event.clone());
        {
            let mut events = self.events.lock().unwrap();
            events.push_back(event);
            if events.len() > self.capacity {
                let keep = self.capacity / 2;
                let drop_count = events.len() - keep;
                events.drain(..drop_count);
            }
        }

        if let Some(event) = alert {
            if let Err(e) = self.alert_sink.notify(&event) {
                warn!("Failed to deliver security alert {}: {}", event.id, e);
            }
        }
    }

    /// Up to `limit` most recent events at or after `since`, oldest first.
    pub fn recent(&self, limit: usize, since: Option<i64>) -> Vec<SecurityEvent> {
        let events = self.events.lock().unwrap();
        let filtered: Vec<&SecurityEvent> = events
            .iter()
            .filter(|e| since.map_or(true, |since| e.timestamp >= since))
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).cloned().collect()
    }

    pub fn metrics(&self) -> SecurityMetrics {
        self.metrics_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn metrics_at(&self, now_ms: i64) -> SecurityMetrics {
        let events = self.events.lock().unwrap();
        let cutoff = now_ms - RECENT_WINDOW_MS;
        SecurityMetrics {
            total_events: events.len(),
            high_risk_events: events.iter().filter(|e| e.risk == RiskLevel::High).count(),
            recent_events: events.iter().filter(|e| e.timestamp > cutoff).count(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::alert::AlertError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        calls: AtomicUsize,
        fail: bool,
    }

    impl AlertSink for CountingSink {
        fn notify(&self, _event: &SecurityEvent) -> Result<(), AlertError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(AlertError("pager offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn event(risk: RiskLevel, message: &str) -> SecurityEvent {
        SecurityEvent::new(SecurityEventType::SuspiciousActivity, risk, message)
    }

    #[test]
    fn records_and_returns_recent_events_in_order() {
        let log = SecurityEventLog::default();
        for i in 0..5 {
            log.record(event(RiskLevel::Medium, &format!("event {i}")));
        }
        let recent = log.recent(3, None);
        let messages: Vec<_> = recent.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["event 2", "event 3", "event 4"]);
    }

    #[test]
    fn recent_filters_by_since() {
        let log = SecurityEventLog::default();
        let mut old = event(RiskLevel::Low, "old");
        old.timestamp = 1_000;
        let mut new = event(RiskLevel::Low, "new");
        new.timestamp = 5_000;
        log.record(old);
        log.record(new);

        let recent = log.recent(DEFAULT_RECENT_LIMIT, Some(2_000));
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "new");
    }

    #[test]
    fn overflow_discards_oldest_half() {
        let log = SecurityEventLog::new(10, Arc::new(TracingAlertSink));
        for i in 0..10 {
            log.record(event(RiskLevel::Low, &format!("e{i}")));
        }
        assert_eq!(log.len(), 10);

        log.record(event(RiskLevel::Low, "e10"));
        assert_eq!(log.len(), 5);
        let first = &log.recent(100, None)[0];
        assert_eq!(first.message, "e6");
    }

    #[test]
    fn high_risk_events_trigger_alert() {
        let sink = Arc::new(CountingSink::default());
        let log = SecurityEventLog::new(100, sink.clone());
        log.record(event(RiskLevel::Medium, "medium"));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
        log.record(event(RiskLevel::High, "high"));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_alert_sink_is_swallowed() {
        let sink = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let log = SecurityEventLog::new(100, sink.clone());
        log.record(event(RiskLevel::High, "high"));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn metrics_count_high_and_recent() {
        let log = SecurityEventLog::default();
        let now = 10 * RECENT_WINDOW_MS;

        let mut stale = event(RiskLevel::High, "stale");
        stale.timestamp = now - RECENT_WINDOW_MS - 1;
        let mut fresh = event(RiskLevel::Medium, "fresh");
        fresh.timestamp = now - 1_000;
        let mut fresh_high = event(RiskLevel::High, "fresh high");
        fresh_high.timestamp = now;
        log.record(stale);
        log.record(fresh);
        log.record(fresh_high);

        assert_eq!(
            log.metrics_at(now),
            SecurityMetrics {
                total_events: 3,
                high_risk_events: 2,
                recent_events: 2,
            }
        );
    }

    #[test]
    fn event_serializes_with_type_field() {
        let e = SecurityEvent::new(
            SecurityEventType::JailbreakAttempt,
            RiskLevel::High,
            "blocked",
        )
        .with_user(Some("u1".to_string()))
        .with_session("s1");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "jailbreak_attempt");
        assert_eq!(json["risk"], "high");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["sessionId"], "s1");
    }
}

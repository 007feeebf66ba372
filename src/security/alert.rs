use tracing::error;

use super::event_log::SecurityEvent;

#[derive(Debug, thiserror::Error)]
#[error("alert delivery failed: {0}")]
pub struct AlertError(pub String);

/// Best-effort side channel for high-risk security events.
///
/// Called synchronously from the request path, so implementations must not
/// block. Failures are logged by the caller and otherwise ignored.
pub trait AlertSink: Send + Sync {
    fn notify(&self, event: &SecurityEvent) -> Result<(), AlertError>;
}

/// Default sink: a single error-level log line per alert.
#[derive(Debug, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn notify(&self, event: &SecurityEvent) -> Result<(), AlertError> {
        error!(
            event_id = %event.id,
            event_type = event.event_type.as_str(),
            user_id = event.user_id.as_deref().unwrap_or("anonymous"),
            "SECURITY ALERT: {}",
            event.message
        );
        Ok(())
    }
}

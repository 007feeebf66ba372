//! Security middleware: risk classification, event log and alerting.

pub mod alert;
pub mod classifier;
pub mod event_log;

pub use alert::{AlertError, AlertSink, TracingAlertSink};
pub use classifier::{Classification, RiskLevel, SecurityClassifier, SuggestedAction, Verdict};
pub use event_log::{SecurityEvent, SecurityEventLog, SecurityEventType, SecurityMetrics};

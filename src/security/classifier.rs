//! Pattern-based risk classification of free-text command payloads.
//!
//! The classifier is a pure function of its input and of the caller's
//! sensitive-data authorization. Recording decisions is left to the caller.

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Instruction override, credential disclosure, destructive SQL and script
/// injection markers. Any match blocks the request.
pub const DEFAULT_HIGH_RISK_PATTERNS: &[&str] = &[
    r"ignore.*previous.*instructions",
    r"bypass.*security",
    r"override.*rules",
    r"system.*prompt",
    r"reveal.*password",
    r"show.*admin",
    r"admin.*password",
    r"database.*config",
    r"api.*key",
    r"delete.*all",
    r"drop.*table",
    r"sql.*injection",
    r"script.*alert",
    r"javascript.*eval",
    r"function.*\(\)",
    r"console\.log",
    r"\$\{.*\}",
    r"<script",
    r"\bon\w+\s*=",
    r"\bsudo\b",
];

/// Topics that are only blocked for callers not authorized for sensitive data.
pub const DEFAULT_SENSITIVE_PATTERNS: &[&str] = &[
    r"password",
    r"secret",
    r"token",
    r"credential",
    r"\bkeys?\b",
    r"config",
];

lazy_static! {
    static ref DEFAULT_HIGH_RISK: Vec<Regex> = compile_patterns(DEFAULT_HIGH_RISK_PATTERNS)
        .expect("built-in high-risk patterns are valid");
    static ref DEFAULT_SENSITIVE: Vec<Regex> = compile_patterns(DEFAULT_SENSITIVE_PATTERNS)
        .expect("built-in sensitive patterns are valid");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    AllowRequest,
    LogNormal,
    RequireAuth,
    LogActivity,
    BlockRequest,
    LogIncident,
    AlertAdmin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub risk: RiskLevel,
    pub verdict: Verdict,
    pub actions: Vec<SuggestedAction>,
    /// Source of the pattern that matched. Internal only, never sent to clients.
    #[serde(skip)]
    pub matched_pattern: Option<String>,
}

impl Classification {
    pub fn is_blocked(&self) -> bool {
        self.verdict == Verdict::Block
    }

    fn low() -> Self {
        Self {
            risk: RiskLevel::Low,
            verdict: Verdict::Allow,
            actions: vec![SuggestedAction::AllowRequest, SuggestedAction::LogNormal],
            matched_pattern: None,
        }
    }
}

pub fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .iter()
        .map(|p| RegexBuilder::new(p.as_ref()).case_insensitive(true).build())
        .collect()
}

#[derive(Debug, Clone)]
pub struct SecurityClassifier {
    high_risk: Vec<Regex>,
    sensitive: Vec<Regex>,
}

impl Default for SecurityClassifier {
    fn default() -> Self {
        Self {
            high_risk: DEFAULT_HIGH_RISK.clone(),
            sensitive: DEFAULT_SENSITIVE.clone(),
        }
    }
}

impl SecurityClassifier {
    pub fn new<S: AsRef<str>>(
        high_risk_patterns: &[S],
        sensitive_patterns: &[S],
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            high_risk: compile_patterns(high_risk_patterns)?,
            sensitive: compile_patterns(sensitive_patterns)?,
        })
    }

    pub fn classify(&self, text: &str, authorized_for_sensitive: bool) -> Classification {
        if let Some(pattern) = first_match(&self.high_risk, text) {
            return Classification {
                risk: RiskLevel::High,
                verdict: Verdict::Block,
                actions: vec![
                    SuggestedAction::BlockRequest,
                    SuggestedAction::LogIncident,
                    SuggestedAction::AlertAdmin,
                ],
                matched_pattern: Some(pattern),
            };
        }

        if let Some(pattern) = first_match(&self.sensitive, text) {
            return if authorized_for_sensitive {
                Classification {
                    risk: RiskLevel::Medium,
                    verdict: Verdict::Allow,
                    actions: vec![SuggestedAction::LogActivity],
                    matched_pattern: Some(pattern),
                }
            } else {
                Classification {
                    risk: RiskLevel::Medium,
                    verdict: Verdict::Block,
                    actions: vec![SuggestedAction::RequireAuth, SuggestedAction::LogActivity],
                    matched_pattern: Some(pattern),
                }
            };
        }

        Classification::low()
    }

    pub fn high_risk_pattern_count(&self) -> usize {
        self.high_risk.len()
    }

    pub fn sensitive_pattern_count(&self) -> usize {
        self.sensitive.len()
    }
}

fn first_match(patterns: &[Regex], text: &str) -> Option<String> {
    patterns
        .iter()
        .find(|re| re.is_match(text))
        .map(|re| re.as_str().to_string())
}

//! Core data models for the alert bridge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Placeholder for fields that could not be recovered from an alert
pub const UNKNOWN: &str = "unknown";

/// Alert severity as reported by the monitoring appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    Warning,
    #[serde(rename = "OK", alias = "Ok")]
    Ok,
    Disabled,
    Unknown,
}

impl Severity {
    /// Parse a severity label, case-insensitively
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Severity::Critical),
            "warning" => Some(Severity::Warning),
            "ok" => Some(Severity::Ok),
            "disabled" => Some(Severity::Disabled),
            "unknown" => Some(Severity::Unknown),
            _ => None,
        }
    }

    /// Severity vocabulary accepted by the incident API
    pub fn incident_severity(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Ok | Severity::Disabled | Severity::Unknown => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "Critical"),
            Severity::Warning => write!(f, "Warning"),
            Severity::Ok => write!(f, "OK"),
            Severity::Disabled => write!(f, "Disabled"),
            Severity::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Lifecycle state of an upstream alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AlertState {
    Active,
    Cleared,
    Locked,
    Other(String),
}

impl AlertState {
    /// Parse a state label; a missing state counts as active
    pub fn parse(label: Option<&str>) -> Self {
        match label.map(|s| s.trim().to_ascii_lowercase()) {
            None => AlertState::Active,
            Some(s) if s.is_empty() || s == "active" => AlertState::Active,
            Some(s) if s == "cleared" => AlertState::Cleared,
            Some(s) if s == "locked" => AlertState::Locked,
            Some(s) => AlertState::Other(s),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, AlertState::Active)
    }
}

/// Alert entry as returned by the monitoring API or pushed to the webhook.
///
/// Every field is optional; interpretation happens during normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAlert {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Kept as raw JSON; appliances disagree on its shape
    #[serde(default)]
    pub associated_resource: Option<serde_json::Value>,
    #[serde(default)]
    pub resource_name: Option<String>,
    #[serde(default)]
    pub physical_resource_type: Option<String>,
    #[serde(default)]
    pub resource_uri: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub alert_state: Option<String>,
    #[serde(default, rename = "alertTypeID")]
    pub alert_type_id: Option<String>,
    #[serde(default)]
    pub health_category: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
}

/// How the dedup key is composed from an alert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupKeyMode {
    /// Alert identity only: a severity change on the same alert is not new
    #[default]
    Identity,
    /// Identity plus severity: an escalation pages again
    IdentitySeverity,
}

impl DedupKeyMode {
    pub fn key_for(&self, identity: &str, severity: Severity) -> String {
        match self {
            DedupKeyMode::Identity => identity.to_string(),
            DedupKeyMode::IdentitySeverity => format!("{}#{}", identity, severity),
        }
    }
}

/// Alert after normalization, ready for dedup and dispatch
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedAlert {
    pub dedup_key: String,
    /// Upstream identity (alert URI or resource id)
    pub identity: String,
    pub severity: Severity,
    pub state: AlertState,
    pub resource_name: String,
    pub category: String,
    pub description: String,
    /// Resource URI the alert refers to, used as the incident source
    pub source: String,
    pub alert_type: Option<String>,
    pub health_category: Option<String>,
    pub urgency: Option<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub first_seen_at: DateTime<Utc>,
}

impl NormalizedAlert {
    /// One-line incident summary
    pub fn summary(&self) -> String {
        format!(
            "{} alert: {} - Resource: {} ({})",
            self.severity, self.description, self.resource_name, self.category
        )
    }
}

/// Why a dispatch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    Timeout,
    Network,
    Rejected,
    Auth,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::Network => "network",
            FailureReason::Rejected => "rejected",
            FailureReason::Auth => "auth",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of delivering one alert to the incident API
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub dedup_key: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    pub attempt_count: u32,
    #[serde(skip)]
    pub duration: Duration,
}

/// Credential returned by a successful login
#[derive(Debug, Clone)]
pub struct AuthGrant {
    pub token: String,
    /// Lifetime declared by the upstream, when it declares one
    pub lifetime: Option<Duration>,
}

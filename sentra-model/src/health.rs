//! Health-check configuration and runtime status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckKind {
    Http,
    Tcp,
    Container,
    Ping,
}

/// A configured health probe. Persisted in `healthchecks.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: HealthCheckKind,
    /// URL for http, `host:port` for tcp/ping, container name or id for
    /// container checks.
    pub target: String,
    #[serde(default)]
    pub interval_secs: u64,
    #[serde(default)]
    pub timeout_secs: u64,
    /// Expected HTTP status; `None` means 200.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_code: Option<u16>,
    /// Remediation action: empty, `notify`, `restart_container:<id>` or
    /// `webhook:<url>`.
    #[serde(default)]
    pub on_fail: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// In-memory probe state for one check. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub check_id: String,
    pub healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_fails: u32,
    pub last_remediation: Option<DateTime<Utc>>,
    pub remediation_action: String,
}

impl HealthStatus {
    pub fn new(check_id: impl Into<String>) -> Self {
        Self {
            check_id: check_id.into(),
            healthy: true,
            last_check: None,
            last_error: None,
            consecutive_fails: 0,
            last_remediation: None,
            remediation_action: String::new(),
        }
    }
}

/// A state-transition history entry (also published on the bus).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthEvent {
    pub check_id: String,
    pub check_name: String,
    pub healthy: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

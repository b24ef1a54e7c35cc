//! Alert rule configuration and evaluation status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// A user-defined rule evaluated against the live snapshot cache.
/// Persisted in `alerts.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Expression over the evaluation context, e.g. `CPU > 90`.
    pub expression: String,
    /// How long the expression must hold before the rule fires. Zero fires
    /// immediately.
    #[serde(default)]
    pub duration_secs: u64,
    pub severity: AlertSeverity,
    /// Delivery channels: `http(s)://` webhooks or the reserved value
    /// `unraid` for the local notification interface.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum minutes between repeated firing dispatches.
    #[serde(default)]
    pub cooldown_minutes: u64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Ok,
    Pending,
    Firing,
}

/// Per-rule evaluation state, kept in memory by the engine.
#[derive(Debug, Clone, Serialize)]
pub struct AlertStatus {
    pub rule_id: String,
    pub state: AlertState,
    pub since: Option<DateTime<Utc>>,
    pub eval_count: u64,
    pub last_message: Option<String>,
}

impl AlertStatus {
    pub fn new(rule_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            state: AlertState::Ok,
            since: None,
            eval_count: 0,
            last_message: None,
        }
    }
}

/// Dispatched when a rule fires or resolves; published on the bus and sent
/// to the rule's channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: AlertSeverity,
    pub state: AlertState,
    pub previous_state: AlertState,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

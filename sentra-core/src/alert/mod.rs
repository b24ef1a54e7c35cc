//! Expression-based alerting over the snapshot cache.
//!
//! Rules are evaluated on a fixed cadence against [`context::EvalContext`];
//! each rule walks the ok → pending → firing state machine and dispatches
//! events to its channels when it fires or resolves.

pub mod context;
pub mod expr;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sentra_model::records::Payload;
use sentra_model::topics;
use sentra_model::{AlertEvent, AlertRule, AlertSeverity, AlertState, AlertStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::control::Notifier;
use crate::store::AlertRuleStore;

use self::context::EvalContext;

/// Default evaluation cadence.
pub const DEFAULT_EVAL_INTERVAL: Duration = Duration::from_secs(10);

const CHANNEL_TIMEOUT: Duration = Duration::from_secs(10);

/// Reserved channel value routing to the local notification interface.
const LOCAL_CHANNEL: &str = "unraid";

#[derive(Debug)]
struct RuleRuntime {
    status: AlertStatus,
    last_fired: Option<DateTime<Utc>>,
}

impl RuleRuntime {
    fn new(rule_id: &str) -> Self {
        Self {
            status: AlertStatus::new(rule_id),
            last_fired: None,
        }
    }
}

pub struct AlertEngine {
    rules: Arc<AlertRuleStore>,
    bus: Arc<EventBus>,
    notifier: Arc<dyn Notifier>,
    http: reqwest::Client,
    eval_interval: Duration,
    runtimes: Mutex<HashMap<String, RuleRuntime>>,
}

impl std::fmt::Debug for AlertEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEngine")
            .field("eval_interval", &self.eval_interval)
            .field("rule_count", &self.rules.len())
            .finish_non_exhaustive()
    }
}

impl AlertEngine {
    pub fn new(rules: Arc<AlertRuleStore>, bus: Arc<EventBus>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            rules,
            bus,
            notifier,
            http: reqwest::Client::new(),
            eval_interval: DEFAULT_EVAL_INTERVAL,
            runtimes: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_eval_interval(mut self, interval: Duration) -> Self {
        self.eval_interval = interval;
        self
    }

    /// Evaluation loop; exits when `token` fires.
    pub async fn run(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.eval_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval = ?self.eval_interval, "alert engine started");
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("alert engine shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.evaluate_once(Utc::now()).await;
                }
            }
        }
    }

    /// One evaluation pass over every enabled rule.
    pub async fn evaluate_once(&self, now: DateTime<Utc>) {
        let ctx = EvalContext::from_cache(self.bus.cache());
        let rules = self.rules.all();

        // Forget runtime state for rules that no longer exist.
        {
            let mut runtimes = self.runtimes.lock();
            runtimes.retain(|id, _| rules.iter().any(|r| &r.id == id));
        }

        let mut events = Vec::new();
        for rule in rules.iter().filter(|r| r.enabled) {
            let expr = match expr::parse(&rule.expression) {
                Ok(expr) => expr,
                Err(err) => {
                    warn!(rule = %rule.name, error = %err, "alert expression failed to parse");
                    continue;
                }
            };
            let value = match expr.eval(&ctx) {
                Ok(value) => value,
                Err(err) => {
                    warn!(rule = %rule.name, error = %err, "alert expression failed to evaluate");
                    continue;
                }
            };
            let active = match &value {
                expr::Value::Bool(b) => *b,
                other => {
                    warn!(rule = %rule.name, value = %other, "alert expression is not boolean");
                    continue;
                }
            };
            let message = format!("{}: {} = {}", rule.name, rule.expression, value);

            let mut runtimes = self.runtimes.lock();
            let runtime = runtimes
                .entry(rule.id.clone())
                .or_insert_with(|| RuleRuntime::new(&rule.id));
            if let Some(event) = step(runtime, rule, active, message, now) {
                events.push((event, rule.channels.clone()));
            }
        }

        for (event, channels) in events {
            self.dispatch(event, &channels).await;
        }
    }

    /// Value snapshots of every rule's evaluation state.
    pub fn statuses(&self) -> Vec<AlertStatus> {
        let mut statuses: Vec<_> = self
            .runtimes
            .lock()
            .values()
            .map(|rt| rt.status.clone())
            .collect();
        statuses.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        statuses
    }

    async fn dispatch(&self, event: AlertEvent, channels: &[String]) {
        debug!(rule = %event.rule_name, state = ?event.state, "alert event");
        self.bus.publish(topics::ALERT, Payload::Alert(event.clone()));

        for channel in channels {
            let result = if channel == LOCAL_CHANNEL {
                self.notify_local(&event).await
            } else if channel.starts_with("http://") || channel.starts_with("https://") {
                self.post_webhook(channel, &event).await
            } else {
                warn!(channel = %channel, "unknown alert channel scheme, skipping");
                continue;
            };
            if let Err(err) = result {
                warn!(channel = %channel, error = %err, "alert channel delivery failed");
            }
        }
    }

    async fn notify_local(&self, event: &AlertEvent) -> crate::Result<()> {
        let importance = match event.severity {
            AlertSeverity::Info => "normal",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "alert",
        };
        self.notifier
            .notify(importance, &event.rule_name, &event.message)
            .await
    }

    async fn post_webhook(&self, url: &str, event: &AlertEvent) -> crate::Result<()> {
        let response = self
            .http
            .post(url)
            .timeout(CHANNEL_TIMEOUT)
            .json(event)
            .send()
            .await
            .map_err(|err| crate::CoreError::Internal(err.to_string()))?;
        if response.status().as_u16() >= 400 {
            return Err(crate::CoreError::Internal(format!(
                "webhook returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Advance one rule through the state machine. Returns the event to
/// dispatch, if any.
fn step(
    runtime: &mut RuleRuntime,
    rule: &AlertRule,
    active: bool,
    message: String,
    now: DateTime<Utc>,
) -> Option<AlertEvent> {
    let status = &mut runtime.status;
    status.eval_count += 1;
    status.last_message = Some(message.clone());

    let previous = status.state;
    let cooldown = chrono::Duration::minutes(rule.cooldown_minutes as i64);
    let duration = chrono::Duration::seconds(rule.duration_secs as i64);

    let fire = |state: AlertState| AlertEvent {
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        severity: rule.severity,
        state,
        previous_state: previous,
        message,
        timestamp: now,
    };

    match (previous, active) {
        (AlertState::Ok, true) => {
            if rule.duration_secs == 0 {
                status.state = AlertState::Firing;
                status.since = Some(now);
                runtime.last_fired = Some(now);
                Some(fire(AlertState::Firing))
            } else {
                status.state = AlertState::Pending;
                status.since = Some(now);
                None
            }
        }
        (AlertState::Ok, false) => None,
        (AlertState::Pending, true) => {
            let held = status
                .since
                .map(|since| now - since >= duration)
                .unwrap_or(false);
            if held {
                status.state = AlertState::Firing;
                status.since = Some(now);
                runtime.last_fired = Some(now);
                Some(fire(AlertState::Firing))
            } else {
                None
            }
        }
        (AlertState::Pending, false) => {
            status.state = AlertState::Ok;
            status.since = None;
            None
        }
        (AlertState::Firing, true) => {
            let cooled = runtime
                .last_fired
                .map(|last| now - last >= cooldown)
                .unwrap_or(true);
            if cooled {
                runtime.last_fired = Some(now);
                Some(fire(AlertState::Firing))
            } else {
                None
            }
        }
        (AlertState::Firing, false) => {
            status.state = AlertState::Ok;
            status.since = None;
            Some(fire(AlertState::Ok))
        }
    }
}

#[cfg(test)]
mod tests {
    use sentra_model::AlertSeverity;

    use super::*;

    fn rule(duration_secs: u64, cooldown_minutes: u64) -> AlertRule {
        AlertRule {
            id: "r1".into(),
            name: "high cpu".into(),
            expression: "CPU > 90".into(),
            duration_secs,
            severity: AlertSeverity::Critical,
            channels: vec![],
            enabled: true,
            cooldown_minutes,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_zero_duration_fires_immediately() {
        let rule = rule(0, 5);
        let mut rt = RuleRuntime::new(&rule.id);
        let event = step(&mut rt, &rule, true, "m".into(), at(0)).expect("firing event");
        assert_eq!(event.state, AlertState::Firing);
        assert_eq!(event.previous_state, AlertState::Ok);
        assert_eq!(rt.status.state, AlertState::Firing);
    }

    #[test]
    fn test_duration_gates_firing() {
        let rule = rule(60, 5);
        let mut rt = RuleRuntime::new(&rule.id);

        assert!(step(&mut rt, &rule, true, "m".into(), at(0)).is_none());
        assert_eq!(rt.status.state, AlertState::Pending);

        // Still inside the hold window.
        assert!(step(&mut rt, &rule, true, "m".into(), at(30)).is_none());
        assert_eq!(rt.status.state, AlertState::Pending);

        let event = step(&mut rt, &rule, true, "m".into(), at(60)).expect("fires at duration");
        assert_eq!(event.state, AlertState::Firing);
        assert_eq!(event.previous_state, AlertState::Pending);
    }

    #[test]
    fn test_pending_resets_without_event() {
        let rule = rule(60, 5);
        let mut rt = RuleRuntime::new(&rule.id);
        assert!(step(&mut rt, &rule, true, "m".into(), at(0)).is_none());
        assert!(step(&mut rt, &rule, false, "m".into(), at(30)).is_none());
        assert_eq!(rt.status.state, AlertState::Ok);
        // A later breach starts the hold window over.
        assert!(step(&mut rt, &rule, true, "m".into(), at(40)).is_none());
        assert!(step(&mut rt, &rule, true, "m".into(), at(90)).is_none());
        assert!(step(&mut rt, &rule, true, "m".into(), at(100)).is_some());
    }

    #[test]
    fn test_cooldown_gates_redispatch() {
        let rule = rule(0, 5);
        let mut rt = RuleRuntime::new(&rule.id);
        assert!(step(&mut rt, &rule, true, "m".into(), at(0)).is_some());
        assert!(step(&mut rt, &rule, true, "m".into(), at(10)).is_none());
        assert!(step(&mut rt, &rule, true, "m".into(), at(299)).is_none());
        let event = step(&mut rt, &rule, true, "m".into(), at(300)).expect("re-fires");
        assert_eq!(event.previous_state, AlertState::Firing);
    }

    #[test]
    fn test_resolve_dispatches_ok_event() {
        let rule = rule(0, 5);
        let mut rt = RuleRuntime::new(&rule.id);
        assert!(step(&mut rt, &rule, true, "m".into(), at(0)).is_some());
        let event = step(&mut rt, &rule, false, "m".into(), at(20)).expect("resolved event");
        assert_eq!(event.state, AlertState::Ok);
        assert_eq!(event.previous_state, AlertState::Firing);
        assert_eq!(rt.status.state, AlertState::Ok);
    }

    #[test]
    fn test_eval_count_and_message_tracked() {
        let rule = rule(0, 5);
        let mut rt = RuleRuntime::new(&rule.id);
        step(&mut rt, &rule, false, "first".into(), at(0));
        step(&mut rt, &rule, false, "second".into(), at(10));
        assert_eq!(rt.status.eval_count, 2);
        assert_eq!(rt.status.last_message.as_deref(), Some("second"));
    }
}

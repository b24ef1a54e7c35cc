//! Health probes with transition detection and cooldown-gated remediation.
//!
//! The loop ticks every five seconds and runs each enabled check whose
//! interval has elapsed. Checks run in their own tasks so a panicking
//! probe never takes the loop down. Transition events feed a bounded
//! history ring and the bus; remediation fires on the healthy→unhealthy
//! edge and then at most once per cooldown window while the check stays
//! unhealthy.

pub mod probe;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sentra_model::records::Payload;
use sentra_model::topics;
use sentra_model::{HealthCheck, HealthEvent, HealthStatus};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::control::{ContainerControl, Notifier};
use crate::store::HealthCheckStore;

/// Loop cadence.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum gap between remediation runs for one check.
pub const REMEDIATION_COOLDOWN_SECS: i64 = 300;

/// Transition events retained for history queries.
pub const HISTORY_CAPACITY: usize = 100;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Parsed `on_fail` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationAction {
    Notify,
    RestartContainer(String),
    Webhook(String),
}

impl RemediationAction {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == "notify" {
            return Some(Self::Notify);
        }
        if let Some(id) = raw.strip_prefix("restart_container:") {
            if !id.is_empty() {
                return Some(Self::RestartContainer(id.to_string()));
            }
            return None;
        }
        if let Some(url) = raw.strip_prefix("webhook:") {
            if url.starts_with("http://") || url.starts_with("https://") {
                return Some(Self::Webhook(url.to_string()));
            }
            return None;
        }
        None
    }
}

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    check_id: &'a str,
    check_name: &'a str,
    target: &'a str,
    error: &'a str,
    timestamp: DateTime<Utc>,
}

pub struct Watchdog {
    checks: Arc<HealthCheckStore>,
    bus: Arc<EventBus>,
    containers: Arc<dyn ContainerControl>,
    notifier: Arc<dyn Notifier>,
    http: reqwest::Client,
    statuses: RwLock<HashMap<String, HealthStatus>>,
    history: Mutex<VecDeque<HealthEvent>>,
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("check_count", &self.checks.len())
            .field("status_count", &self.statuses.read().len())
            .finish_non_exhaustive()
    }
}

impl Watchdog {
    pub fn new(
        checks: Arc<HealthCheckStore>,
        bus: Arc<EventBus>,
        containers: Arc<dyn ContainerControl>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            checks,
            bus,
            containers,
            notifier,
            http: reqwest::Client::new(),
            statuses: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
        })
    }

    /// Probe loop; exits when `token` fires.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("watchdog started");
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("watchdog shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }
    }

    async fn tick(self: &Arc<Self>, now: DateTime<Utc>) {
        let checks = self.checks.all();

        // Forget state for checks that were deleted.
        {
            let mut statuses = self.statuses.write();
            statuses.retain(|id, _| checks.iter().any(|c| &c.id == id));
        }

        let mut handles = Vec::new();
        for check in checks.into_iter().filter(|c| c.enabled) {
            if !self.is_due(&check, now) {
                continue;
            }
            let watchdog = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let result = probe::run(&watchdog.http, watchdog.bus.cache(), &check).await;
                watchdog.apply(&check, result, now).await;
            }));
        }
        for handle in handles {
            if let Err(err) = handle.await {
                if err.is_panic() {
                    error!("health check panicked");
                }
            }
        }
    }

    fn is_due(&self, check: &HealthCheck, now: DateTime<Utc>) -> bool {
        let statuses = self.statuses.read();
        match statuses.get(&check.id).and_then(|s| s.last_check) {
            Some(last) => now - last >= chrono::Duration::seconds(check.interval_secs as i64),
            None => true,
        }
    }

    /// Fold one probe result into the check's status, emitting transition
    /// events and deciding remediation. Split from the probe so tests can
    /// drive the state machine with fabricated clocks.
    async fn apply(&self, check: &HealthCheck, result: Result<(), String>, now: DateTime<Utc>) {
        let ok = result.is_ok();
        let error = result.err();

        let (became_unhealthy, recovered, remediate) = {
            let mut statuses = self.statuses.write();
            let status = statuses
                .entry(check.id.clone())
                .or_insert_with(|| HealthStatus::new(&check.id));

            let prev_healthy = status.healthy;
            status.healthy = ok;
            status.last_check = Some(now);
            status.last_error = error.clone();
            if ok {
                status.consecutive_fails = 0;
            } else {
                status.consecutive_fails += 1;
            }

            let became_unhealthy = prev_healthy && !ok;
            let recovered = !prev_healthy && ok;

            let remediate = if !ok && !check.on_fail.is_empty() {
                let cooled = status
                    .last_remediation
                    .map(|last| now - last >= chrono::Duration::seconds(REMEDIATION_COOLDOWN_SECS))
                    .unwrap_or(true);
                if cooled {
                    status.last_remediation = Some(now);
                    status.remediation_action = check.on_fail.clone();
                    true
                } else {
                    false
                }
            } else {
                false
            };
            (became_unhealthy, recovered, remediate)
        };

        if became_unhealthy || remediate {
            let message = error.clone().unwrap_or_else(|| "probe failed".to_string());
            self.record_event(check, false, message, now);
        }
        if recovered {
            self.record_event(check, true, "recovered".to_string(), now);
        }

        if remediate {
            let error = error.unwrap_or_default();
            if let Some(action) = RemediationAction::parse(&check.on_fail) {
                if let Err(err) = self.remediate(check, &action, &error, now).await {
                    warn!(check = %check.name, error = %err, "remediation failed");
                }
            } else {
                warn!(check = %check.name, action = %check.on_fail, "unrecognised on_fail action");
            }
        }
    }

    fn record_event(&self, check: &HealthCheck, healthy: bool, message: String, now: DateTime<Utc>) {
        let event = HealthEvent {
            check_id: check.id.clone(),
            check_name: check.name.clone(),
            healthy,
            message,
            timestamp: now,
        };
        debug!(check = %check.name, healthy, "health transition");
        {
            let mut history = self.history.lock();
            if history.len() == HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
        self.bus.publish(topics::HEALTH, Payload::Health(event));
    }

    async fn remediate(
        &self,
        check: &HealthCheck,
        action: &RemediationAction,
        error: &str,
        now: DateTime<Utc>,
    ) -> crate::Result<()> {
        info!(check = %check.name, action = ?action, "running remediation");
        match action {
            RemediationAction::Notify => {
                self.notifier
                    .notify(
                        "warning",
                        &format!("Health check failed: {}", check.name),
                        error,
                    )
                    .await
            }
            RemediationAction::RestartContainer(id) => self.containers.restart(id).await,
            RemediationAction::Webhook(url) => {
                let body = WebhookBody {
                    check_id: &check.id,
                    check_name: &check.name,
                    target: &check.target,
                    error,
                    timestamp: now,
                };
                let response = self
                    .http
                    .post(url)
                    .timeout(WEBHOOK_TIMEOUT)
                    .json(&body)
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
    }

    /// Status snapshot per known check.
    pub fn statuses(&self) -> Vec<HealthStatus> {
        let mut statuses: Vec<_> = self.statuses.read().values().cloned().collect();
        statuses.sort_by(|a, b| a.check_id.cmp(&b.check_id));
        statuses
    }

    pub fn status(&self, check_id: &str) -> Option<HealthStatus> {
        self.statuses.read().get(check_id).cloned()
    }

    /// Transition history, newest first.
    pub fn history(&self) -> Vec<HealthEvent> {
        self.history.lock().iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use sentra_model::HealthCheckKind;

    use crate::store::health_checks_path;

    use super::*;

    #[derive(Default)]
    struct Recording {
        notifications: Mutex<Vec<String>>,
        restarts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, _importance: &str, subject: &str, _message: &str) -> crate::Result<()> {
            self.notifications.lock().push(subject.to_string());
            Ok(())
        }

        async fn archive_all(&self) -> crate::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ContainerControl for Recording {
        async fn start(&self, _name: &str) -> crate::Result<()> {
            Ok(())
        }
        async fn stop(&self, _name: &str) -> crate::Result<()> {
            Ok(())
        }
        async fn restart(&self, name: &str) -> crate::Result<()> {
            self.restarts.lock().push(name.to_string());
            Ok(())
        }
        async fn pause(&self, _name: &str) -> crate::Result<()> {
            Ok(())
        }
        async fn unpause(&self, _name: &str) -> crate::Result<()> {
            Ok(())
        }
    }

    fn check(on_fail: &str) -> HealthCheck {
        HealthCheck {
            id: "c1".into(),
            name: "api".into(),
            kind: HealthCheckKind::Http,
            target: "http://localhost:9".into(),
            interval_secs: 10,
            timeout_secs: 1,
            success_code: Some(200),
            on_fail: on_fail.into(),
            enabled: true,
        }
    }

    fn harness() -> (Arc<Watchdog>, Arc<Recording>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(HealthCheckStore::open(health_checks_path(dir.path())).unwrap());
        let bus = EventBus::new();
        let recording = Arc::new(Recording::default());
        let watchdog = Watchdog::new(
            store,
            bus,
            Arc::clone(&recording) as Arc<dyn ContainerControl>,
            Arc::clone(&recording) as Arc<dyn Notifier>,
        );
        (watchdog, recording, dir)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_remediation_action_parsing() {
        assert_eq!(RemediationAction::parse("notify"), Some(RemediationAction::Notify));
        assert_eq!(
            RemediationAction::parse("restart_container:web"),
            Some(RemediationAction::RestartContainer("web".into()))
        );
        assert_eq!(
            RemediationAction::parse("webhook:https://hooks.example/x"),
            Some(RemediationAction::Webhook("https://hooks.example/x".into()))
        );
        assert_eq!(RemediationAction::parse("restart_container:"), None);
        assert_eq!(RemediationAction::parse("webhook:ftp://nope"), None);
        assert_eq!(RemediationAction::parse("explode"), None);
    }

    #[tokio::test]
    async fn test_cooldown_limits_remediation_over_twelve_minutes() {
        let (watchdog, recording, _dir) = harness();
        let check = check("notify");

        // 12 simulated minutes of a permanently failing probe at 10s
        // intervals.
        for i in 0..72 {
            watchdog
                .apply(&check, Err("status 500 (expected 200)".into()), at(i * 10))
                .await;
        }

        // One remediation per 5-minute window: t+0, t+300, t+600.
        assert_eq!(recording.notifications.lock().len(), 3);

        // One unhealthy history event per remediation window as well.
        let history = watchdog.history();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|e| !e.healthy));
        // Newest first.
        assert_eq!(history[0].timestamp, at(600));
        assert_eq!(history[2].timestamp, at(0));

        let status = watchdog.status("c1").expect("status");
        assert_eq!(status.consecutive_fails, 72);
        assert!(!status.healthy);
        assert_eq!(status.last_remediation, Some(at(600)));
    }

    #[tokio::test]
    async fn test_recovery_resets_counter_and_emits_event() {
        let (watchdog, _recording, _dir) = harness();
        let check = check("");

        watchdog.apply(&check, Err("boom".into()), at(0)).await;
        watchdog.apply(&check, Err("boom".into()), at(10)).await;
        watchdog.apply(&check, Ok(()), at(20)).await;

        let status = watchdog.status("c1").expect("status");
        assert!(status.healthy);
        assert_eq!(status.consecutive_fails, 0);

        let history = watchdog.history();
        // One unhealthy transition, one recovery; the same-state failure
        // in between emits nothing.
        assert_eq!(history.len(), 2);
        assert!(history[0].healthy);
        assert_eq!(history[0].message, "recovered");
        assert!(!history[1].healthy);
    }

    #[tokio::test]
    async fn test_no_remediation_without_on_fail() {
        let (watchdog, recording, _dir) = harness();
        let check = check("");
        for i in 0..10 {
            watchdog.apply(&check, Err("down".into()), at(i * 10)).await;
        }
        assert!(recording.notifications.lock().is_empty());
        // Only the transition event.
        assert_eq!(watchdog.history().len(), 1);
    }

    #[tokio::test]
    async fn test_restart_container_remediation() {
        let (watchdog, recording, _dir) = harness();
        let check = check("restart_container:plex");
        watchdog.apply(&check, Err("down".into()), at(0)).await;
        assert_eq!(recording.restarts.lock().as_slice(), ["plex"]);
    }

    #[tokio::test]
    async fn test_history_ring_is_bounded() {
        let (watchdog, _recording, _dir) = harness();
        let check = check("");
        // Alternate failure/recovery so every apply emits one event.
        for i in 0..(HISTORY_CAPACITY as i64 + 20) {
            let result = if i % 2 == 0 { Err("down".into()) } else { Ok(()) };
            watchdog.apply(&check, result, at(i * 10)).await;
        }
        assert_eq!(watchdog.history().len(), HISTORY_CAPACITY);
    }
}

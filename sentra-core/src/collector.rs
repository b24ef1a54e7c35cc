//! Lifecycle management for periodic collectors.
//!
//! A collector is an opaque factory: each call produces one collection
//! future which gathers metrics and publishes them on the bus. The manager
//! owns the periodic task around it — start/stop/retime at runtime, with
//! cancel-then-join semantics so callers never observe a half-dead task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex as SyncMutex;
use sentra_model::records::{CollectorStateChange, Payload};
use sentra_model::topics;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::error::{CoreError, Result};

pub const MIN_INTERVAL_SECS: u64 = 5;
pub const MAX_INTERVAL_SECS: u64 = 3600;

/// One collection per call. The future must be self-contained: it publishes
/// its output to the collector's topic and reports failure through its
/// `Result`.
pub type CollectorFactory = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorState {
    Registered,
    Running,
    Stopped,
    Disabled,
}

impl std::fmt::Display for CollectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollectorState::Registered => "registered",
            CollectorState::Running => "running",
            CollectorState::Stopped => "stopped",
            CollectorState::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Value snapshot of a managed collector, safe to hand to API consumers.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorStatus {
    pub name: String,
    pub required: bool,
    pub interval_secs: u64,
    pub enabled: bool,
    pub state: CollectorState,
    pub last_run: Option<DateTime<Utc>>,
    pub error_count: u64,
}

/// Mutable run-state shared with the collector task.
#[derive(Debug, Default)]
struct RunShared {
    last_run: SyncMutex<Option<DateTime<Utc>>>,
    error_count: AtomicU64,
}

struct Entry {
    name: String,
    required: bool,
    interval_secs: u64,
    enabled: bool,
    state: CollectorState,
    factory: CollectorFactory,
    shared: Arc<RunShared>,
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl Entry {
    fn status(&self) -> CollectorStatus {
        CollectorStatus {
            name: self.name.clone(),
            required: self.required,
            interval_secs: self.interval_secs,
            enabled: self.enabled,
            state: self.state,
            last_run: *self.shared.last_run.lock(),
            error_count: self.shared.error_count.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("interval_secs", &self.interval_secs)
            .field("enabled", &self.enabled)
            .field("state", &self.state)
            .field("running", &self.token.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct CollectorManager {
    bus: Arc<EventBus>,
    entries: Mutex<HashMap<String, Entry>>,
    shutdown: CancellationToken,
}

impl CollectorManager {
    /// `shutdown` is the process-wide cancellation scope; every collector
    /// task runs under a child token of it.
    pub fn new(bus: Arc<EventBus>, shutdown: CancellationToken) -> Self {
        Self {
            bus,
            entries: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Add a collector. Re-registering a name replaces the previous entry
    /// (a running task for the old entry is cancelled first). An interval
    /// of zero registers the collector in the `disabled` state.
    pub async fn register(
        &self,
        name: &str,
        factory: CollectorFactory,
        default_interval_secs: u64,
        required: bool,
    ) {
        let mut entries = self.entries.lock().await;
        if let Some(mut old) = entries.remove(name) {
            warn!(collector = %name, "re-registering collector, replacing previous entry");
            if let (Some(token), Some(handle)) = (old.token.take(), old.handle.take()) {
                token.cancel();
                drop(entries);
                let _ = handle.await;
                entries = self.entries.lock().await;
            }
        }
        let state = if default_interval_secs == 0 {
            CollectorState::Disabled
        } else {
            CollectorState::Registered
        };
        entries.insert(
            name.to_string(),
            Entry {
                name: name.to_string(),
                required,
                interval_secs: default_interval_secs,
                enabled: default_interval_secs > 0,
                state,
                factory,
                shared: Arc::new(RunShared::default()),
                token: None,
                handle: None,
            },
        );
        debug!(collector = %name, interval = default_interval_secs, "collector registered");
    }

    /// Spawn a task for every enabled collector; returns the number
    /// started.
    pub async fn start_all(&self) -> usize {
        let mut started = Vec::new();
        {
            let mut entries = self.entries.lock().await;
            for entry in entries.values_mut() {
                if entry.enabled && entry.token.is_none() && entry.state != CollectorState::Disabled
                {
                    self.spawn_task(entry);
                    started.push((entry.name.clone(), entry.interval_secs));
                }
            }
        }
        for (name, interval) in &started {
            self.emit_state(name, CollectorState::Running, *interval);
        }
        info!(count = started.len(), "collectors started");
        started.len()
    }

    /// Start a stopped collector with its current interval. Running
    /// collectors are left alone.
    pub async fn enable(&self, name: &str) -> Result<()> {
        let (state, interval) = {
            let mut entries = self.entries.lock().await;
            let entry = entries
                .get_mut(name)
                .ok_or_else(|| CoreError::UnknownCollector(name.to_string()))?;
            if entry.token.is_some() {
                return Ok(());
            }
            if entry.interval_secs == 0 {
                return Err(CoreError::InvalidInterval(0));
            }
            entry.enabled = true;
            self.spawn_task(entry);
            (entry.state, entry.interval_secs)
        };
        self.emit_state(name, state, interval);
        info!(collector = %name, "collector enabled");
        Ok(())
    }

    /// Cancel a running collector's task and wait for it to finish.
    /// Required collectors cannot be disabled; disabling a stopped
    /// collector is a no-op.
    pub async fn disable(&self, name: &str) -> Result<()> {
        let (token, handle, interval) = {
            let mut entries = self.entries.lock().await;
            let entry = entries
                .get_mut(name)
                .ok_or_else(|| CoreError::UnknownCollector(name.to_string()))?;
            if entry.required {
                return Err(CoreError::RequiredCollector(name.to_string()));
            }
            if entry.token.is_none() {
                return Ok(());
            }
            entry.enabled = false;
            entry.state = CollectorState::Stopped;
            (entry.token.take(), entry.handle.take(), entry.interval_secs)
        };
        if let Some(token) = token {
            token.cancel();
        }
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.emit_state(name, CollectorState::Stopped, interval);
        info!(collector = %name, "collector disabled");
        Ok(())
    }

    /// Change a collector's interval, restarting its task when running.
    /// Out-of-range values fail and leave the previous interval intact.
    pub async fn update_interval(&self, name: &str, interval_secs: u64) -> Result<()> {
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&interval_secs) {
            return Err(CoreError::InvalidInterval(interval_secs));
        }
        let (restart, state) = {
            let mut entries = self.entries.lock().await;
            let entry = entries
                .get_mut(name)
                .ok_or_else(|| CoreError::UnknownCollector(name.to_string()))?;
            entry.interval_secs = interval_secs;
            if entry.state == CollectorState::Disabled {
                // Registered with interval 0; a valid interval makes it
                // startable again.
                entry.state = CollectorState::Registered;
                entry.enabled = true;
            }
            match (entry.token.take(), entry.handle.take()) {
                (Some(token), Some(handle)) => (Some((token, handle)), entry.state),
                _ => (None, entry.state),
            }
        };
        if let Some((token, handle)) = restart {
            token.cancel();
            let _ = handle.await;
            let mut entries = self.entries.lock().await;
            if let Some(entry) = entries.get_mut(name) {
                self.spawn_task(entry);
            }
        }
        self.emit_state(name, state, interval_secs);
        info!(collector = %name, interval = interval_secs, "collector interval updated");
        Ok(())
    }

    pub async fn status(&self, name: &str) -> Result<CollectorStatus> {
        let entries = self.entries.lock().await;
        entries
            .get(name)
            .map(Entry::status)
            .ok_or_else(|| CoreError::UnknownCollector(name.to_string()))
    }

    pub async fn all_status(&self) -> Vec<CollectorStatus> {
        let entries = self.entries.lock().await;
        let mut statuses: Vec<_> = entries.values().map(Entry::status).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Cancel every running task and join them all. Used at shutdown.
    pub async fn stop_all(&self) {
        let stopping: Vec<(String, u64, CancellationToken, JoinHandle<()>)> = {
            let mut entries = self.entries.lock().await;
            entries
                .values_mut()
                .filter_map(|entry| {
                    let token = entry.token.take()?;
                    let handle = entry.handle.take()?;
                    entry.state = CollectorState::Stopped;
                    Some((entry.name.clone(), entry.interval_secs, token, handle))
                })
                .collect()
        };
        for (_, _, token, _) in &stopping {
            token.cancel();
        }
        for (name, interval, _, handle) in stopping {
            let _ = handle.await;
            self.emit_state(&name, CollectorState::Stopped, interval);
        }
        info!("all collectors stopped");
    }

    /// Must be called with the entry lock held; flips the entry to running.
    fn spawn_task(&self, entry: &mut Entry) {
        let token = self.shutdown.child_token();
        let handle = tokio::spawn(run_loop(
            entry.name.clone(),
            entry.interval_secs,
            Arc::clone(&entry.factory),
            Arc::clone(&entry.shared),
            token.clone(),
        ));
        entry.token = Some(token);
        entry.handle = Some(handle);
        entry.state = CollectorState::Running;
    }

    fn emit_state(&self, name: &str, state: CollectorState, interval_secs: u64) {
        self.bus.publish(
            topics::COLLECTOR_STATE,
            Payload::CollectorState(CollectorStateChange {
                name: name.to_string(),
                state: state.to_string(),
                interval_secs,
            }),
        );
    }
}

/// The periodic task body: one collection immediately, then one per
/// interval, exiting promptly on cancellation. A failing or panicking
/// collection bumps the error counter and never stops the loop — the
/// collection runs in its own task so a panic is contained there.
async fn run_loop(
    name: String,
    interval_secs: u64,
    factory: CollectorFactory,
    shared: Arc<RunShared>,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!(collector = %name, "collector task cancelled");
                break;
            }
            _ = ticker.tick() => {
                *shared.last_run.lock() = Some(Utc::now());
                match tokio::spawn((factory)()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        shared.error_count.fetch_add(1, Ordering::Relaxed);
                        warn!(collector = %name, error = %err, "collection failed");
                    }
                    Err(join_err) => {
                        shared.error_count.fetch_add(1, Ordering::Relaxed);
                        if join_err.is_panic() {
                            error!(collector = %name, "collection panicked");
                        }
                    }
                }
            }
        }
    }
}

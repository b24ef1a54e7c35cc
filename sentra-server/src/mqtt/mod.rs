//! MQTT publisher: broker connection lifecycle, state mirroring,
//! Home-Assistant discovery maintenance and inbound command routing.

pub mod commands;
pub mod discovery;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use sentra_core::bus::EventBus;
use sentra_core::control::Controllers;
use sentra_model::records::{Payload, Record};
use sentra_model::{is_physical_interface, topics};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;

use self::discovery::{DiscoveryScope, DiscoveryTracker, EntityCategory};

const CHANNEL_CAPACITY: usize = 64;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const KEEP_ALIVE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disabled,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// Status snapshot for the REST surface.
#[derive(Debug, Clone, Serialize)]
pub struct MqttStatus {
    pub state: ConnectionState,
    pub last_error: Option<String>,
    pub messages_sent: u64,
    pub messages_errors: u64,
}

pub struct MqttPublisher {
    cfg: MqttConfig,
    scope: DiscoveryScope,
    bus: Arc<EventBus>,
    controllers: Controllers,
    client: RwLock<Option<AsyncClient>>,
    state: RwLock<ConnectionState>,
    last_error: Mutex<Option<String>>,
    sent: AtomicU64,
    errors: AtomicU64,
    discovery: Mutex<DiscoveryTracker>,
}

impl std::fmt::Debug for MqttPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttPublisher")
            .field("state", &*self.state.read())
            .field("prefix", &self.cfg.prefix)
            .finish_non_exhaustive()
    }
}

impl MqttPublisher {
    pub fn new(
        cfg: MqttConfig,
        hostname: String,
        bus: Arc<EventBus>,
        controllers: Controllers,
    ) -> Arc<Self> {
        let scope = DiscoveryScope {
            host: hostname,
            prefix: cfg.prefix.clone(),
            ha_prefix: cfg.ha_prefix.clone(),
        };
        let state = if cfg.enabled {
            ConnectionState::Connecting
        } else {
            ConnectionState::Disabled
        };
        Arc::new(Self {
            cfg,
            scope,
            bus,
            controllers,
            client: RwLock::new(None),
            state: RwLock::new(state),
            last_error: Mutex::new(None),
            sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            discovery: Mutex::new(DiscoveryTracker::default()),
        })
    }

    pub fn status(&self) -> MqttStatus {
        MqttStatus {
            state: *self.state.read(),
            last_error: self.last_error.lock().clone(),
            messages_sent: self.sent.load(Ordering::Relaxed),
            messages_errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn is_connected(&self) -> bool {
        *self.state.read() == ConnectionState::Connected
    }

    /// Broker loop plus one bus forwarder per mirrored topic. Returns
    /// immediately when MQTT is disabled.
    pub async fn run(self: Arc<Self>, token: CancellationToken, tracker: TaskTracker) {
        if !self.cfg.enabled {
            info!("MQTT disabled");
            return;
        }

        self.spawn_forwarders(token.clone(), &tracker);

        let mut options = MqttOptions::new(
            self.cfg.client_id.clone(),
            self.cfg.host.clone(),
            self.cfg.port,
        );
        options.set_keep_alive(KEEP_ALIVE);
        if let (Some(user), Some(pass)) = (&self.cfg.username, &self.cfg.password) {
            options.set_credentials(user.clone(), pass.clone());
        }
        // The broker publishes our absence for us.
        options.set_last_will(LastWill::new(
            self.cfg.availability_topic(),
            "offline",
            QoS::AtLeastOnce,
            true,
        ));

        let (client, mut event_loop) = AsyncClient::new(options, CHANNEL_CAPACITY);
        *self.client.write() = Some(client);
        info!(host = %self.cfg.host, port = self.cfg.port, "MQTT connecting");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    *self.state.write() = ConnectionState::Closed;
                    let client = self.client.write().take();
                    if let Some(client) = client {
                        let _ = client.disconnect().await;
                    }
                    info!("MQTT publisher shutting down");
                    break;
                }
                event = event_loop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        self.on_connected().await;
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        self.on_command(&publish.topic, &publish.payload).await;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        {
                            let mut state = self.state.write();
                            if *state == ConnectionState::Connected {
                                *state = ConnectionState::Reconnecting;
                            }
                        }
                        *self.last_error.lock() = Some(err.to_string());
                        warn!(error = %err, "MQTT connection error, retrying");
                        tokio::select! {
                            _ = token.cancelled() => {}
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                }
            }
        }
    }

    fn spawn_forwarders(self: &Arc<Self>, token: CancellationToken, tracker: &TaskTracker) {
        for topic in MIRRORED_TOPICS {
            let publisher = Arc::clone(self);
            let subscription = self.bus.subscribe(topic, Some(CHANNEL_CAPACITY));
            let token = token.clone();
            tracker.spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        record = subscription.recv() => {
                            let Some(record) = record else { break };
                            publisher.handle_record(&record).await;
                        }
                    }
                }
            });
        }
    }

    async fn on_connected(&self) {
        *self.state.write() = ConnectionState::Connected;
        *self.last_error.lock() = None;
        info!("MQTT connected");

        self.publish_raw(&self.cfg.availability_topic(), "online".into(), true)
            .await;
        let client = self.client.read().clone();
        if let Some(client) = client {
            if let Err(err) = client
                .subscribe(self.cfg.command_filter(), QoS::AtLeastOnce)
                .await
            {
                warn!(error = %err, "failed to subscribe to command topics");
            }
        }

        if self.cfg.ha_discovery {
            // A fresh session has no retained discovery state on our side;
            // republish everything the cache knows about.
            self.discovery.lock().clear();
            for category in EntityCategory::ALL {
                if let Some(topic) = snapshot_topic(*category) {
                    if let Some(record) = self.bus.cache().latest(topic) {
                        self.sync_discovery(*category, &record.payload).await;
                    }
                }
            }
        }
    }

    /// Mirror one bus record to its MQTT topic, then reconcile discovery
    /// for entity-bearing payloads.
    async fn handle_record(&self, record: &Record) {
        let Some(mqtt_topic) = mirror_topic(&record.topic) else {
            return;
        };
        let topic = format!("{}/{}", self.cfg.prefix, mqtt_topic);

        let body = match &record.payload {
            // Ephemeral container/VM plumbing stays local.
            Payload::Interfaces(interfaces) => {
                let physical: Vec<_> = interfaces
                    .iter()
                    .filter(|i| is_physical_interface(&i.name))
                    .collect();
                serde_json::to_string(&physical)
            }
            payload => serde_json::to_string(payload),
        };
        let body = match body {
            Ok(body) => body,
            Err(err) => {
                warn!(topic = %record.topic, error = %err, "failed to serialise record");
                return;
            }
        };

        self.publish_raw(&topic, body, true).await;

        if self.cfg.ha_discovery {
            if let Some(category) = discovery::category_of(&record.payload) {
                self.sync_discovery(category, &record.payload).await;
            }
        }
    }

    /// Publish configs for every current entity and an empty retained
    /// payload for each one that vanished since the last publish.
    async fn sync_discovery(&self, category: EntityCategory, payload: &Payload) {
        let entries = discovery::entries_for(&self.scope, category, payload);
        let current: HashSet<String> = entries.iter().map(|e| e.unique_id.clone()).collect();
        let removed = self.discovery.lock().diff(category, &current);

        for unique_id in removed {
            // Component choice must match the original config topic.
            let component = match category {
                EntityCategory::Container | EntityCategory::Vm => "switch",
                _ => "sensor",
            };
            let topic = self.scope.config_topic(component, &unique_id);
            debug!(entity = %unique_id, "clearing retained discovery entry");
            self.publish_raw(&topic, String::new(), true).await;
        }

        for entry in entries {
            let topic = self.scope.config_topic(entry.component, &entry.unique_id);
            match serde_json::to_string(&entry) {
                Ok(body) => self.publish_raw(&topic, body, true).await,
                Err(err) => warn!(error = %err, "failed to serialise discovery entry"),
            }
        }
    }

    async fn on_command(&self, topic: &str, payload: &[u8]) {
        let prefix = format!("{}/cmd/", self.cfg.prefix);
        let Some(path) = topic.strip_prefix(prefix.as_str()) else {
            return;
        };
        // Results are published under the command subtree; never treat our
        // own output as a command.
        if path.ends_with("/result") {
            return;
        }
        let payload = String::from_utf8_lossy(payload).to_string();
        debug!(path = %path, "MQTT command received");

        let result_doc = match commands::parse(path, &payload) {
            Ok(command) => {
                let controllers = self.controllers.clone();
                // Handlers run in their own task: a panicking controller
                // surfaces as an error result, not a dead publisher.
                match tokio::spawn(async move { commands::dispatch(command, &controllers).await })
                    .await
                {
                    Ok(Ok(())) => json!({ "status": "ok", "command": path }),
                    Ok(Err(err)) => {
                        json!({ "status": "error", "command": path, "error": err.to_string() })
                    }
                    Err(join_err) if join_err.is_panic() => {
                        warn!(path = %path, "command handler panicked");
                        json!({ "status": "error", "command": path, "error": "handler panicked" })
                    }
                    Err(_) => {
                        json!({ "status": "error", "command": path, "error": "handler cancelled" })
                    }
                }
            }
            Err(err) => json!({ "status": "error", "command": path, "error": err }),
        };

        self.publish_raw(&format!("{topic}/result"), result_doc.to_string(), false)
            .await;
    }

    /// All publishes funnel through here. While disabled or disconnected
    /// this is a silent no-op — callers observe transient broker state
    /// only via [`MqttPublisher::status`].
    async fn publish_raw(&self, topic: &str, body: String, retain: bool) {
        if !self.is_connected() {
            return;
        }
        let Some(client) = self.client.read().clone() else {
            return;
        };
        match client.publish(topic, QoS::AtLeastOnce, retain, body).await {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                *self.last_error.lock() = Some(err.to_string());
                warn!(topic = %topic, error = %err, "MQTT publish failed");
            }
        }
    }
}

/// Bus topics mirrored to the broker and their sub-topics under the
/// configured prefix.
const MIRRORED_TOPICS: &[&str] = &[
    topics::SYSTEM,
    topics::ARRAY,
    topics::DISKS,
    topics::CONTAINERS,
    topics::VMS,
    topics::GPUS,
    topics::NETWORK,
    topics::SHARES,
    topics::ZFS,
    topics::UPS,
    topics::NOTIFICATIONS,
];

fn mirror_topic(bus_topic: &str) -> Option<&'static str> {
    match bus_topic {
        topics::SYSTEM => Some("system"),
        topics::ARRAY => Some("array"),
        topics::DISKS => Some("disks"),
        topics::CONTAINERS => Some("docker/containers"),
        topics::VMS => Some("vm/list"),
        topics::GPUS => Some("gpu"),
        topics::NETWORK => Some("network"),
        topics::SHARES => Some("shares"),
        topics::ZFS => Some("zfs"),
        topics::UPS => Some("ups"),
        topics::NOTIFICATIONS => Some("notifications"),
        _ => None,
    }
}

/// The bus topic whose cached record seeds discovery for a category.
fn snapshot_topic(category: EntityCategory) -> Option<&'static str> {
    match category {
        EntityCategory::Disk => Some(topics::DISKS),
        EntityCategory::Container => Some(topics::CONTAINERS),
        EntityCategory::Vm => Some(topics::VMS),
        EntityCategory::Gpu => Some(topics::GPUS),
        EntityCategory::Interface => Some(topics::NETWORK),
        EntityCategory::Share => Some(topics::SHARES),
        EntityCategory::ZfsPool => Some(topics::ZFS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_topic_covers_all_mirrored() {
        for topic in MIRRORED_TOPICS {
            assert!(mirror_topic(topic).is_some(), "{topic}");
        }
        assert_eq!(mirror_topic(topics::COLLECTOR_STATE), None);
        assert_eq!(mirror_topic(topics::ALERT), None);
    }

    #[test]
    fn test_every_category_has_a_snapshot_topic() {
        for category in EntityCategory::ALL {
            assert!(snapshot_topic(*category).is_some());
        }
    }
}

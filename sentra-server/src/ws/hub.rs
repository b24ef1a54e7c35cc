//! Client registry and broadcast fan-out for the WebSocket surface.
//!
//! The hub holds at most [`MAX_CLIENTS`] clients. Each client owns a
//! bounded drop-oldest outbound queue; broadcast is one non-blocking
//! enqueue per client, so no client can stall the hub or its peers. A
//! client that keeps overflowing its queue inside a short window is
//! evicted by cancelling its connection token.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use sentra_core::bus::queue::Bounded;
use sentra_core::bus::EventBus;
use sentra_model::records::Record;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use uuid::Uuid;

pub const MAX_CLIENTS: usize = 10;
pub const OUTBOUND_CAPACITY: usize = 256;
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Overflow drops tolerated inside [`DROP_EVICT_WINDOW`] before eviction.
pub const DROP_EVICT_THRESHOLD: u64 = 64;
pub const DROP_EVICT_WINDOW: Duration = Duration::from_secs(10);

/// Outbound wire frame.
#[derive(Debug, Serialize)]
struct Frame<'a> {
    event: &'a str,
    timestamp: String,
    data: &'a sentra_model::records::Payload,
}

/// Serialise a bus record into its WebSocket frame.
pub fn encode_frame(record: &Record) -> serde_json::Result<String> {
    serde_json::to_string(&Frame {
        event: &record.topic,
        timestamp: record.timestamp.to_rfc3339(),
        data: &record.payload,
    })
}

#[derive(Debug)]
pub struct ClientHandle {
    pub id: Uuid,
    outbound: Bounded<Arc<str>>,
    topics: RwLock<HashSet<String>>,
    last_pong: Mutex<Instant>,
    drop_window: Mutex<(Instant, u64)>,
    pub cancel: CancellationToken,
}

impl ClientHandle {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            outbound: Bounded::new(OUTBOUND_CAPACITY),
            topics: RwLock::new(HashSet::new()),
            last_pong: Mutex::new(Instant::now()),
            drop_window: Mutex::new((Instant::now(), 0)),
            cancel: CancellationToken::new(),
        }
    }

    fn wants(&self, topic: &str) -> bool {
        let topics = self.topics.read();
        topics.is_empty() || topics.contains(topic)
    }

    /// Replace the topic filter (empty = everything).
    pub fn set_topics(&self, topics: HashSet<String>) {
        *self.topics.write() = topics;
    }

    pub fn touch_pong(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    pub fn pong_overdue(&self) -> bool {
        self.last_pong.lock().elapsed() > PONG_TIMEOUT
    }

    pub async fn next_frame(&self) -> Option<Arc<str>> {
        self.outbound.recv().await
    }

    pub fn dropped(&self) -> u64 {
        self.outbound.dropped()
    }

    fn enqueue(&self, frame: Arc<str>) {
        if !self.outbound.push(frame) {
            return;
        }
        let mut window = self.drop_window.lock();
        if window.0.elapsed() > DROP_EVICT_WINDOW {
            *window = (Instant::now(), 0);
        }
        window.1 += 1;
        if window.1 > DROP_EVICT_THRESHOLD && !self.cancel.is_cancelled() {
            warn!(client = %self.id, drops = window.1, "evicting slow WebSocket client");
            self.cancel.cancel();
        }
    }
}

#[derive(Debug, Default)]
pub struct WsHub {
    clients: RwLock<HashMap<Uuid, Arc<ClientHandle>>>,
}

/// Registration failure: the hub is at capacity.
#[derive(Debug, PartialEq, Eq)]
pub struct HubFull;

impl WsHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Admit a client, enforcing the connection cap.
    pub fn register(&self) -> Result<Arc<ClientHandle>, HubFull> {
        let mut clients = self.clients.write();
        if clients.len() >= MAX_CLIENTS {
            return Err(HubFull);
        }
        let client = Arc::new(ClientHandle::new());
        clients.insert(client.id, Arc::clone(&client));
        debug!(client = %client.id, count = clients.len(), "WebSocket client registered");
        Ok(client)
    }

    pub fn remove(&self, id: Uuid) {
        let mut clients = self.clients.write();
        if clients.remove(&id).is_some() {
            debug!(client = %id, count = clients.len(), "WebSocket client removed");
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_full(&self) -> bool {
        self.clients.read().len() >= MAX_CLIENTS
    }

    /// Enqueue one pre-encoded frame on every interested client.
    pub fn broadcast(&self, topic: &str, frame: Arc<str>) {
        let clients = self.clients.read();
        for client in clients.values() {
            if client.wants(topic) {
                client.enqueue(Arc::clone(&frame));
            }
        }
    }

    /// One forwarder task per broadcast topic: bus subscription → encode
    /// once → fan out to client queues.
    pub fn spawn_forwarders(
        self: &Arc<Self>,
        bus: &Arc<EventBus>,
        token: CancellationToken,
        tracker: &TaskTracker,
    ) {
        for topic in sentra_model::topics::BROADCAST {
            let hub = Arc::clone(self);
            let subscription = bus.subscribe(topic, Some(OUTBOUND_CAPACITY));
            let token = token.clone();
            tracker.spawn(async move {
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        record = subscription.recv() => {
                            let Some(record) = record else { break };
                            match encode_frame(&record) {
                                Ok(frame) => hub.broadcast(&record.topic, Arc::from(frame)),
                                Err(err) => {
                                    warn!(topic = %record.topic, error = %err, "failed to encode frame");
                                }
                            }
                        }
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use sentra_model::records::{Payload, SystemSample};

    use super::*;

    #[test]
    fn test_client_cap_rejects_the_eleventh() {
        let hub = WsHub::new();
        let clients: Vec<_> = (0..MAX_CLIENTS).map(|_| hub.register().unwrap()).collect();
        assert_eq!(hub.client_count(), MAX_CLIENTS);
        assert!(hub.is_full());
        assert_eq!(hub.register().unwrap_err(), HubFull);

        // Freeing a slot admits again.
        hub.remove(clients[0].id);
        assert!(hub.register().is_ok());
    }

    #[test]
    fn test_broadcast_respects_topic_filter() {
        let hub = WsHub::new();
        let all = hub.register().unwrap();
        let filtered = hub.register().unwrap();
        filtered.set_topics(HashSet::from(["system_update".to_string()]));

        hub.broadcast("system_update", Arc::from("{\"a\":1}"));
        hub.broadcast("disk_list_update", Arc::from("{\"b\":2}"));

        let mut all_frames = 0;
        while all.outbound.try_recv().is_some() {
            all_frames += 1;
        }
        let mut filtered_frames = 0;
        while filtered.outbound.try_recv().is_some() {
            filtered_frames += 1;
        }
        assert_eq!(all_frames, 2);
        assert_eq!(filtered_frames, 1);
    }

    #[test]
    fn test_persistent_overflow_evicts_client() {
        let hub = WsHub::new();
        let client = hub.register().unwrap();

        for n in 0..(OUTBOUND_CAPACITY as u64 + DROP_EVICT_THRESHOLD + 2) {
            hub.broadcast("t", Arc::from(format!("{{\"n\":{n}}}")));
        }

        assert!(client.cancel.is_cancelled());
        assert!(client.dropped() > DROP_EVICT_THRESHOLD);
    }

    #[test]
    fn test_frame_shape() {
        let record = Record::new(
            "system_update",
            Payload::System(SystemSample {
                hostname: "nas".into(),
                ..Default::default()
            }),
        );
        let frame = encode_frame(&record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "system_update");
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
        assert_eq!(value["data"]["hostname"], "nas");
    }
}

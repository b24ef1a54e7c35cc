//! Topic-addressed in-process pub/sub.
//!
//! Publishers never block: each subscription holds its own bounded
//! [`queue::Bounded`] and a full queue drops its oldest record. The
//! snapshot cache is written synchronously before any subscriber sees the
//! record, so the latest value per topic survives arbitrary queue drops.

pub mod queue;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use sentra_model::records::{Payload, Record};

use crate::cache::SnapshotCache;

use self::queue::Bounded;

/// Default per-subscription queue capacity.
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug)]
struct SubShared {
    id: u64,
    topic: String,
    queue: Bounded<Arc<Record>>,
}

#[derive(Debug, Default)]
pub struct EventBus {
    cache: SnapshotCache,
    subscribers: Mutex<HashMap<String, Vec<Arc<SubShared>>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish a payload on `topic`. The snapshot cache is updated first;
    /// fan-out to subscriptions is non-blocking and per-queue lossy.
    pub fn publish(&self, topic: &str, payload: Payload) {
        let record = Arc::new(Record::new(topic, payload));
        self.cache.store(Arc::clone(&record));

        let targets: Vec<Arc<SubShared>> = {
            let subscribers = self.subscribers.lock();
            match subscribers.get(topic) {
                Some(subs) => subs.clone(),
                None => return,
            }
        };
        for sub in targets {
            sub.queue.push(Arc::clone(&record));
        }
    }

    /// Create a subscription on `topic` with the given queue capacity
    /// (`None` = [`DEFAULT_CAPACITY`]). The topic is created implicitly.
    pub fn subscribe(self: &Arc<Self>, topic: &str, capacity: Option<usize>) -> Subscription {
        let shared = Arc::new(SubShared {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            topic: topic.to_string(),
            queue: Bounded::new(capacity.unwrap_or(DEFAULT_CAPACITY)),
        });
        self.subscribers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(Arc::clone(&shared));
        Subscription {
            shared,
            bus: Arc::downgrade(self),
        }
    }

    /// Topics currently alive: anything with a live subscriber or a cached
    /// record.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .subscribers
            .lock()
            .iter()
            .filter(|(_, subs)| !subs.is_empty())
            .map(|(topic, _)| topic.clone())
            .collect();
        for topic in self.cache.topics() {
            if !topics.contains(&topic) {
                topics.push(topic);
            }
        }
        topics.sort();
        topics
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    fn detach(&self, topic: &str, id: u64) {
        let mut subscribers = self.subscribers.lock();
        if let Some(subs) = subscribers.get_mut(topic) {
            subs.retain(|sub| sub.id != id);
            if subs.is_empty() {
                subscribers.remove(topic);
            }
        }
    }
}

/// A single-topic, single-consumer stream of records. Dropping the handle
/// (or calling [`Subscription::unsubscribe`]) detaches it from the bus;
/// the bus never closes a subscription on its own.
#[derive(Debug)]
pub struct Subscription {
    shared: Arc<SubShared>,
    bus: Weak<EventBus>,
}

impl Subscription {
    /// Await the next record. `None` only after `unsubscribe`.
    pub async fn recv(&self) -> Option<Arc<Record>> {
        self.shared.queue.recv().await
    }

    pub fn try_recv(&self) -> Option<Arc<Record>> {
        self.shared.queue.try_recv()
    }

    pub fn topic(&self) -> &str {
        &self.shared.topic
    }

    /// Records discarded because this subscriber fell behind.
    pub fn dropped(&self) -> u64 {
        self.shared.queue.dropped()
    }

    pub fn len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.detach(&self.shared.topic, self.shared.id);
        }
        self.shared.queue.close();
    }
}

#[cfg(test)]
mod tests {
    use sentra_model::records::SystemSample;

    use super::*;

    fn sample(cpu: f64) -> Payload {
        Payload::System(SystemSample {
            cpu_usage_pct: cpu,
            ..Default::default()
        })
    }

    fn cpu_of(record: &Record) -> f64 {
        match &record.payload {
            Payload::System(sample) => sample.cpu_usage_pct,
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fanout_preserves_publish_order() {
        let bus = EventBus::new();
        let sub = bus.subscribe("t", None);
        for n in 0..10 {
            bus.publish("t", sample(n as f64));
        }
        for n in 0..10 {
            let record = sub.recv().await.expect("record");
            assert_eq!(cpu_of(&record), n as f64);
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_keeps_most_recent() {
        let bus = EventBus::new();
        let slow = bus.subscribe("t", Some(4));
        let fast = bus.subscribe("t", Some(4));

        let mut seen_by_fast = Vec::new();
        for n in 0..10 {
            bus.publish("t", sample(n as f64));
            // The fast subscriber keeps up; the slow one is never drained.
            while let Some(record) = fast.try_recv() {
                seen_by_fast.push(cpu_of(&record));
            }
        }

        assert_eq!(seen_by_fast, (0..10).map(f64::from).collect::<Vec<_>>());
        assert_eq!(fast.dropped(), 0);

        let mut left_for_slow = Vec::new();
        while let Some(record) = slow.try_recv() {
            left_for_slow.push(cpu_of(&record));
        }
        assert_eq!(left_for_slow, vec![6.0, 7.0, 8.0, 9.0]);
        assert_eq!(slow.dropped(), 6);
    }

    #[tokio::test]
    async fn test_cache_retains_latest_despite_queue_drops() {
        let bus = EventBus::new();
        let _sub = bus.subscribe("t", Some(1));
        for n in 0..5 {
            bus.publish("t", sample(n as f64));
        }
        let latest = bus.cache().latest("t").expect("cached record");
        assert_eq!(cpu_of(&latest), 4.0);
    }

    #[tokio::test]
    async fn test_unsubscribe_detaches_topic() {
        let bus = EventBus::new();
        let sub = bus.subscribe("t", None);
        assert_eq!(bus.topics(), vec!["t".to_string()]);
        sub.unsubscribe();
        assert!(bus.topics().is_empty());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_still_caches() {
        let bus = EventBus::new();
        bus.publish("lonely", sample(1.0));
        assert!(bus.cache().latest("lonely").is_some());
        assert_eq!(bus.topics(), vec!["lonely".to_string()]);
    }
}

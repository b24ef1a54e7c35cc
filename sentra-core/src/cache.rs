//! Latest-record-per-topic view over the bus.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sentra_model::records::Record;

/// Read-through cache consulted by the alert engine, the watchdog's
/// container probe and the REST surface. Writes are serialised per map
/// access; readers always observe a whole record.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    records: RwLock<HashMap<String, Arc<Record>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, record: Arc<Record>) {
        self.records
            .write()
            .insert(record.topic.clone(), record);
    }

    /// The most recent record on `topic`, or `None` when the topic has
    /// never been published.
    pub fn latest(&self, topic: &str) -> Option<Arc<Record>> {
        self.records.read().get(topic).cloned()
    }

    pub fn topics(&self) -> Vec<String> {
        self.records.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use sentra_model::records::Payload;
    use sentra_model::SystemSample;

    use super::*;

    #[test]
    fn test_latest_replaces_previous() {
        let cache = SnapshotCache::new();
        for n in 0..3u64 {
            cache.store(Arc::new(Record::new(
                "t",
                Payload::System(SystemSample {
                    uptime_secs: n,
                    ..Default::default()
                }),
            )));
        }
        let record = cache.latest("t").expect("record");
        match &record.payload {
            Payload::System(sample) => assert_eq!(sample.uptime_secs, 2),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_never_published_is_none() {
        let cache = SnapshotCache::new();
        assert!(cache.latest("missing").is_none());
    }
}

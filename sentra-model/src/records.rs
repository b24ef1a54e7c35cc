//! The record envelope and the typed payloads collectors publish.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::AlertEvent;
use crate::health::HealthEvent;
use crate::net::InterfaceInfo;
use crate::ups::UpsStatus;

/// An immutable value published on the event bus. Records are stamped at
/// publish time and passed around by reference (`Arc<Record>`); nothing
/// mutates one after it leaves the publisher.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    pub topic: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
}

impl Record {
    pub fn new(topic: impl Into<String>, payload: Payload) -> Self {
        Self {
            topic: topic.into(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Topic-specific payload shapes. The bus itself is payload-agnostic; this
/// enum exists so consumers (cache readers, the alert context, the MQTT
/// mirror) get typed access without downcasting. Serialized untagged: the
/// wire form is the payload body alone.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    System(SystemSample),
    Array(ArrayStatus),
    Disks(Vec<DiskInfo>),
    Containers(Vec<ContainerInfo>),
    Vms(Vec<VmInfo>),
    Gpus(Vec<GpuInfo>),
    Interfaces(Vec<InterfaceInfo>),
    Shares(Vec<ShareInfo>),
    ZfsPools(Vec<ZfsPoolInfo>),
    Ups(UpsStatus),
    Notifications(Vec<NotificationInfo>),
    CollectorState(CollectorStateChange),
    Health(HealthEvent),
    Alert(AlertEvent),
}

/// Host-level metrics sampled each collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemSample {
    pub hostname: String,
    pub cpu_usage_pct: f64,
    pub cpu_temp_c: Option<f64>,
    pub load_avg: [f64; 3],
    pub ram_total_bytes: u64,
    pub ram_used_bytes: u64,
    pub ram_used_pct: f64,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParityCheck {
    pub active: bool,
    pub progress_pct: f64,
    pub speed_bytes_per_sec: u64,
}

/// Storage-array state as reported by the platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArrayStatus {
    pub state: String,
    pub parity_valid: bool,
    pub parity_check: ParityCheck,
    pub total_bytes: u64,
    pub used_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskInfo {
    pub id: String,
    pub device: String,
    pub name: String,
    pub temp_c: Option<f64>,
    pub size_bytes: u64,
    pub used_bytes: u64,
    pub smart_errors: u64,
    pub spun_down: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    /// Runtime state string (`running`, `exited`, `paused`, ...).
    pub state: String,
    pub cpu_pct: f64,
    pub mem_bytes: u64,
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmInfo {
    pub id: String,
    pub name: String,
    pub state: String,
    pub vcpus: u32,
    pub mem_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GpuInfo {
    pub id: String,
    pub name: String,
    pub utilization_pct: f64,
    pub mem_used_bytes: u64,
    pub mem_total_bytes: u64,
    pub temp_c: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareInfo {
    pub name: String,
    pub size_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZfsPoolInfo {
    pub name: String,
    pub health: String,
    pub size_bytes: u64,
    pub allocated_bytes: u64,
    pub fragmentation_pct: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationInfo {
    pub id: String,
    pub subject: String,
    pub description: String,
    pub importance: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Emitted on the bus whenever a managed collector changes lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorStateChange {
    pub name: String,
    pub state: String,
    pub interval_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_serializes_untagged() {
        let payload = Payload::System(SystemSample {
            hostname: "nas".into(),
            cpu_usage_pct: 12.5,
            ..Default::default()
        });
        let value = serde_json::to_value(&payload).unwrap();
        // The wire form is the payload body alone, no enum tag.
        assert_eq!(value["hostname"], "nas");
        assert_eq!(value["cpu_usage_pct"], 12.5);
        assert!(value.get("System").is_none());
    }

    #[test]
    fn test_record_envelope_carries_topic_and_timestamp() {
        let record = Record::new("system_update", Payload::Containers(Vec::new()));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["topic"], "system_update");
        assert!(value["timestamp"].is_string());
        assert!(value["payload"].is_array());
    }
}

//! Shared data models for the Sentra host agent.
//!
//! Everything that crosses a component boundary lives here: the typed
//! metric payloads collectors produce, the record envelope the event bus
//! carries, health-check and alert-rule configuration, and the small pure
//! mappings (NUT status codes, physical-interface matching) that both the
//! MQTT layer and the REST surface rely on.

pub mod alerts;
pub mod health;
pub mod net;
pub mod records;
pub mod topics;
pub mod ups;

pub use alerts::{AlertEvent, AlertRule, AlertSeverity, AlertState, AlertStatus};
pub use health::{HealthCheck, HealthCheckKind, HealthEvent, HealthStatus};
pub use net::{is_physical_interface, InterfaceInfo};
pub use records::{
    ArrayStatus, CollectorStateChange, ContainerInfo, DiskInfo, GpuInfo, NotificationInfo,
    ParityCheck, Payload, Record, ShareInfo, SystemSample, VmInfo, ZfsPoolInfo,
};
pub use ups::{nut_status_label, UpsStatus};

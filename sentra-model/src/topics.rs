//! Bus topic names.
//!
//! Topics are open-ended strings created implicitly on first publish or
//! subscribe; these constants name the ones the built-in collectors and
//! control paths use.

pub const SYSTEM: &str = "system_update";
pub const ARRAY: &str = "array_update";
pub const DISKS: &str = "disk_list_update";
pub const CONTAINERS: &str = "container_list_update";
pub const VMS: &str = "vm_list_update";
pub const GPUS: &str = "gpu_update";
pub const NETWORK: &str = "network_update";
pub const SHARES: &str = "share_list_update";
pub const ZFS: &str = "zfs_update";
pub const UPS: &str = "ups_update";
pub const NOTIFICATIONS: &str = "notification_update";

pub const COLLECTOR_STATE: &str = "collector_state_change";
pub const HEALTH: &str = "health_check_update";
pub const ALERT: &str = "alert_event";

/// Topics mirrored to external consumers (WebSocket clients and the MQTT
/// broker). Control topics are included so dashboards see lifecycle events.
pub const BROADCAST: &[&str] = &[
    SYSTEM,
    ARRAY,
    DISKS,
    CONTAINERS,
    VMS,
    GPUS,
    NETWORK,
    SHARES,
    ZFS,
    UPS,
    NOTIFICATIONS,
    COLLECTOR_STATE,
    HEALTH,
    ALERT,
];

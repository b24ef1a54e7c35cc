//! Home-Assistant discovery: entry construction and lifecycle tracking.
//!
//! Everything here is pure so the churn semantics (exactly one retained
//! clear per vanished entity) can be tested without a broker.

use std::collections::{HashMap, HashSet};

use sentra_model::records::Payload;
use sentra_model::{is_physical_interface, InterfaceInfo};
use serde::Serialize;

/// Maps an arbitrary name (disk label, container name, interface) to a
/// discovery-safe identifier: lowercase, anything outside `[a-z0-9_]`
/// becomes `_`. Runs of `_` are deliberately not collapsed so distinct
/// inputs stay distinct. Idempotent.
pub fn sanitize_id(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityCategory {
    Disk,
    Container,
    Vm,
    Gpu,
    Interface,
    Share,
    ZfsPool,
}

impl EntityCategory {
    pub const ALL: &'static [EntityCategory] = &[
        EntityCategory::Disk,
        EntityCategory::Container,
        EntityCategory::Vm,
        EntityCategory::Gpu,
        EntityCategory::Interface,
        EntityCategory::Share,
        EntityCategory::ZfsPool,
    ];
}

/// Remembers the `unique_id` set last published per category so the next
/// publish can clear entities that disappeared.
#[derive(Debug, Default)]
pub struct DiscoveryTracker {
    published: HashMap<EntityCategory, HashSet<String>>,
}

impl DiscoveryTracker {
    /// Record `current` as the live set for `category` and return the ids
    /// that vanished since the previous publish.
    pub fn diff(&mut self, category: EntityCategory, current: &HashSet<String>) -> Vec<String> {
        let previous = self.published.entry(category).or_default();
        let mut removed: Vec<String> = previous.difference(current).cloned().collect();
        removed.sort();
        *previous = current.clone();
        removed
    }

    pub fn clear(&mut self) {
        self.published.clear();
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceDescriptor {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
}

/// One HA discovery config payload.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryEntry {
    #[serde(skip)]
    pub component: &'static str,
    pub name: String,
    pub unique_id: String,
    pub state_topic: String,
    pub availability_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_on: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_off: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
    pub device: DeviceDescriptor,
}

/// Stable naming shared by all entries of one agent instance.
#[derive(Debug, Clone)]
pub struct DiscoveryScope {
    pub host: String,
    pub prefix: String,
    pub ha_prefix: String,
}

impl DiscoveryScope {
    fn device(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            identifiers: vec![format!("sentra_{}", sanitize_id(&self.host))],
            name: self.host.clone(),
            manufacturer: "Sentra",
            model: "Host Agent",
        }
    }

    fn availability(&self) -> String {
        format!("{}/availability", self.prefix)
    }

    /// `<ha_prefix>/<component>/<sanitized host>/<sanitized id>/config`
    pub fn config_topic(&self, component: &str, unique_id: &str) -> String {
        format!(
            "{}/{}/{}/{}/config",
            self.ha_prefix,
            component,
            sanitize_id(&self.host),
            sanitize_id(unique_id)
        )
    }

    fn sensor(
        &self,
        name: String,
        unique_id: String,
        state_topic: String,
        value_template: String,
        unit: Option<&'static str>,
    ) -> DiscoveryEntry {
        DiscoveryEntry {
            component: "sensor",
            name,
            unique_id,
            state_topic,
            availability_topic: self.availability(),
            command_topic: None,
            value_template: Some(value_template),
            payload_on: None,
            payload_off: None,
            unit_of_measurement: unit,
            device: self.device(),
        }
    }

    fn switch(
        &self,
        name: String,
        unique_id: String,
        state_topic: String,
        command_topic: String,
        value_template: String,
    ) -> DiscoveryEntry {
        DiscoveryEntry {
            component: "switch",
            name,
            unique_id,
            state_topic,
            availability_topic: self.availability(),
            command_topic: Some(command_topic),
            value_template: Some(value_template),
            payload_on: Some("ON"),
            payload_off: Some("OFF"),
            unit_of_measurement: None,
            device: self.device(),
        }
    }
}

/// Build the discovery entries for one category out of the latest
/// snapshot payload. Returns an empty set when the payload shape does not
/// match the category.
pub fn entries_for(
    scope: &DiscoveryScope,
    category: EntityCategory,
    payload: &Payload,
) -> Vec<DiscoveryEntry> {
    let host = sanitize_id(&scope.host);
    match (category, payload) {
        (EntityCategory::Container, Payload::Containers(containers)) => containers
            .iter()
            .map(|c| {
                scope.switch(
                    format!("Docker {}", c.name),
                    format!("{host}_docker_{}", sanitize_id(&c.name)),
                    format!("{}/docker/containers", scope.prefix),
                    format!("{}/cmd/docker/{}/set", scope.prefix, c.name),
                    format!(
                        "{{{{ 'ON' if (value_json | selectattr('name', 'equalto', '{}') | \
                         list | first | default({{}})).state == 'running' else 'OFF' }}}}",
                        c.name
                    ),
                )
            })
            .collect(),
        (EntityCategory::Vm, Payload::Vms(vms)) => vms
            .iter()
            .map(|vm| {
                scope.switch(
                    format!("VM {}", vm.name),
                    format!("{host}_vm_{}", sanitize_id(&vm.name)),
                    format!("{}/vm/list", scope.prefix),
                    format!("{}/cmd/vm/{}/set", scope.prefix, vm.name),
                    format!(
                        "{{{{ 'ON' if (value_json | selectattr('name', 'equalto', '{}') | \
                         list | first | default({{}})).state == 'running' else 'OFF' }}}}",
                        vm.name
                    ),
                )
            })
            .collect(),
        (EntityCategory::Disk, Payload::Disks(disks)) => disks
            .iter()
            .map(|d| {
                scope.sensor(
                    format!("Disk {} Temperature", d.name),
                    format!("{host}_disk_{}", sanitize_id(&d.id)),
                    format!("{}/disks", scope.prefix),
                    format!(
                        "{{{{ (value_json | selectattr('id', 'equalto', '{}') | list | \
                         first | default({{}})).temp_c }}}}",
                        d.id
                    ),
                    Some("°C"),
                )
            })
            .collect(),
        (EntityCategory::Gpu, Payload::Gpus(gpus)) => gpus
            .iter()
            .map(|g| {
                scope.sensor(
                    format!("GPU {} Utilization", g.name),
                    format!("{host}_gpu_{}", sanitize_id(&g.id)),
                    format!("{}/gpu", scope.prefix),
                    format!(
                        "{{{{ (value_json | selectattr('id', 'equalto', '{}') | list | \
                         first | default({{}})).utilization_pct }}}}",
                        g.id
                    ),
                    Some("%"),
                )
            })
            .collect(),
        (EntityCategory::Interface, Payload::Interfaces(interfaces)) => interfaces
            .iter()
            .filter(|i| is_physical_interface(&i.name))
            .map(|i: &InterfaceInfo| {
                scope.sensor(
                    format!("Network {}", i.name),
                    format!("{host}_net_{}", sanitize_id(&i.name)),
                    format!("{}/network", scope.prefix),
                    format!(
                        "{{{{ (value_json | selectattr('name', 'equalto', '{}') | list | \
                         first | default({{}})).rx_bytes_per_sec }}}}",
                        i.name
                    ),
                    Some("B/s"),
                )
            })
            .collect(),
        (EntityCategory::Share, Payload::Shares(shares)) => shares
            .iter()
            .map(|s| {
                scope.sensor(
                    format!("Share {}", s.name),
                    format!("{host}_share_{}", sanitize_id(&s.name)),
                    format!("{}/shares", scope.prefix),
                    format!(
                        "{{{{ (value_json | selectattr('name', 'equalto', '{}') | list | \
                         first | default({{}})).used_bytes }}}}",
                        s.name
                    ),
                    Some("B"),
                )
            })
            .collect(),
        (EntityCategory::ZfsPool, Payload::ZfsPools(pools)) => pools
            .iter()
            .map(|p| {
                scope.sensor(
                    format!("ZFS {}", p.name),
                    format!("{host}_zfs_{}", sanitize_id(&p.name)),
                    format!("{}/zfs", scope.prefix),
                    format!(
                        "{{{{ (value_json | selectattr('name', 'equalto', '{}') | list | \
                         first | default({{}})).health }}}}",
                        p.name
                    ),
                    None,
                )
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Which category a payload feeds, if any.
pub fn category_of(payload: &Payload) -> Option<EntityCategory> {
    match payload {
        Payload::Disks(_) => Some(EntityCategory::Disk),
        Payload::Containers(_) => Some(EntityCategory::Container),
        Payload::Vms(_) => Some(EntityCategory::Vm),
        Payload::Gpus(_) => Some(EntityCategory::Gpu),
        Payload::Interfaces(_) => Some(EntityCategory::Interface),
        Payload::Shares(_) => Some(EntityCategory::Share),
        Payload::ZfsPools(_) => Some(EntityCategory::ZfsPool),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use sentra_model::records::ContainerInfo;

    use super::*;

    fn scope() -> DiscoveryScope {
        DiscoveryScope {
            host: "Tower NAS".into(),
            prefix: "unraid".into(),
            ha_prefix: "homeassistant".into(),
        }
    }

    fn containers(names: &[&str]) -> Payload {
        Payload::Containers(
            names
                .iter()
                .map(|name| ContainerInfo {
                    name: name.to_string(),
                    state: "running".into(),
                    ..Default::default()
                })
                .collect(),
        )
    }

    #[test]
    fn test_sanitize_lowercases_and_maps() {
        assert_eq!(sanitize_id("Cache Drive 1"), "cache_drive_1");
        assert_eq!(sanitize_id("My-Disk!"), "my_disk_");
        assert_eq!(sanitize_id("br0"), "br0");
        // Consecutive replacements are not collapsed.
        assert_eq!(sanitize_id("a--b"), "a__b");
        assert_eq!(sanitize_id("a  b"), "a__b");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for raw in ["Plex Media", "nvme0n1", "ZFS/pool#1", "äöü"] {
            let once = sanitize_id(raw);
            assert_eq!(sanitize_id(&once), once, "{raw}");
        }
    }

    #[test]
    fn test_config_topic_shape() {
        let scope = scope();
        assert_eq!(
            scope.config_topic("switch", "tower_nas_docker_plex"),
            "homeassistant/switch/tower_nas/tower_nas_docker_plex/config"
        );
    }

    #[test]
    fn test_container_entries() {
        let scope = scope();
        let entries = entries_for(&scope, EntityCategory::Container, &containers(&["plex", "db"]));
        assert_eq!(entries.len(), 2);
        let plex = &entries[0];
        assert_eq!(plex.component, "switch");
        assert_eq!(plex.unique_id, "tower_nas_docker_plex");
        assert_eq!(plex.state_topic, "unraid/docker/containers");
        assert_eq!(
            plex.command_topic.as_deref(),
            Some("unraid/cmd/docker/plex/set")
        );
        assert_eq!(plex.availability_topic, "unraid/availability");
    }

    #[test]
    fn test_interface_entries_filter_virtual_names() {
        let scope = scope();
        let payload = Payload::Interfaces(vec![
            InterfaceInfo {
                name: "eth0".into(),
                ..Default::default()
            },
            InterfaceInfo {
                name: "veth1234".into(),
                ..Default::default()
            },
            InterfaceInfo {
                name: "docker0".into(),
                ..Default::default()
            },
        ]);
        let entries = entries_for(&scope, EntityCategory::Interface, &payload);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].unique_id, "tower_nas_net_eth0");
    }

    #[test]
    fn test_tracker_clears_only_vanished_entities() {
        let mut tracker = DiscoveryTracker::default();

        let first: HashSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert!(tracker.diff(EntityCategory::Container, &first).is_empty());

        let second: HashSet<String> = ["a", "c", "d"].iter().map(|s| s.to_string()).collect();
        let removed = tracker.diff(EntityCategory::Container, &second);
        assert_eq!(removed, vec!["b".to_string()]);

        // A repeat publish of the same set clears nothing.
        assert!(tracker.diff(EntityCategory::Container, &second).is_empty());
    }

    #[test]
    fn test_tracker_categories_are_independent() {
        let mut tracker = DiscoveryTracker::default();
        let set: HashSet<String> = ["x"].iter().map(|s| s.to_string()).collect();
        tracker.diff(EntityCategory::Container, &set);
        // Disks never saw "x"; an empty disk publish clears nothing.
        assert!(tracker.diff(EntityCategory::Disk, &HashSet::new()).is_empty());
        // Containers going empty clears "x".
        assert_eq!(
            tracker.diff(EntityCategory::Container, &HashSet::new()),
            vec!["x".to_string()]
        );
    }

    #[test]
    fn test_discovery_payload_serialization() {
        let scope = scope();
        let entries = entries_for(&scope, EntityCategory::Container, &containers(&["plex"]));
        let value = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(value["unique_id"], "tower_nas_docker_plex");
        assert_eq!(value["payload_on"], "ON");
        assert_eq!(value["device"]["manufacturer"], "Sentra");
        // The component routes the topic; it is not part of the payload.
        assert!(value.get("component").is_none());
    }
}

//! Registration glue between the platform and the collector manager.
//!
//! One managed collector per metric family; each collection asks the
//! platform for a fresh snapshot and publishes it on the collector's fixed
//! bus topic.

use std::sync::Arc;

use sentra_core::bus::EventBus;
use sentra_core::collector::{CollectorFactory, CollectorManager};
use sentra_model::records::Payload;
use sentra_model::topics;

use crate::platform::Platform;

#[derive(Debug, Clone, Copy)]
enum SourceKind {
    System,
    Array,
    Disks,
    Containers,
    Vms,
    Gpus,
    Network,
    Shares,
    Zfs,
    Ups,
    Notifications,
}

/// (collector name, kind, default interval seconds, required)
const SOURCES: &[(&str, SourceKind, u64, bool)] = &[
    ("system", SourceKind::System, 10, true),
    ("array", SourceKind::Array, 30, true),
    ("disks", SourceKind::Disks, 60, false),
    ("docker", SourceKind::Containers, 30, false),
    ("vm", SourceKind::Vms, 60, false),
    ("gpu", SourceKind::Gpus, 30, false),
    ("network", SourceKind::Network, 15, false),
    ("shares", SourceKind::Shares, 300, false),
    ("zfs", SourceKind::Zfs, 120, false),
    ("ups", SourceKind::Ups, 30, false),
    ("notifications", SourceKind::Notifications, 60, false),
];

fn factory(bus: Arc<EventBus>, platform: Arc<dyn Platform>, kind: SourceKind) -> CollectorFactory {
    Arc::new(move || {
        let bus = Arc::clone(&bus);
        let platform = Arc::clone(&platform);
        Box::pin(async move {
            let (topic, payload) = match kind {
                SourceKind::System => (topics::SYSTEM, Payload::System(platform.system().await?)),
                SourceKind::Array => (topics::ARRAY, Payload::Array(platform.array().await?)),
                SourceKind::Disks => (topics::DISKS, Payload::Disks(platform.disks().await?)),
                SourceKind::Containers => (
                    topics::CONTAINERS,
                    Payload::Containers(platform.containers().await?),
                ),
                SourceKind::Vms => (topics::VMS, Payload::Vms(platform.vms().await?)),
                SourceKind::Gpus => (topics::GPUS, Payload::Gpus(platform.gpus().await?)),
                SourceKind::Network => (
                    topics::NETWORK,
                    Payload::Interfaces(platform.interfaces().await?),
                ),
                SourceKind::Shares => (topics::SHARES, Payload::Shares(platform.shares().await?)),
                SourceKind::Zfs => (topics::ZFS, Payload::ZfsPools(platform.zfs_pools().await?)),
                SourceKind::Ups => (topics::UPS, Payload::Ups(platform.ups().await?)),
                SourceKind::Notifications => (
                    topics::NOTIFICATIONS,
                    Payload::Notifications(platform.notifications().await?),
                ),
            };
            bus.publish(topic, payload);
            Ok(())
        })
    })
}

/// Register the standard collector set.
pub async fn register_all(
    manager: &CollectorManager,
    bus: &Arc<EventBus>,
    platform: Arc<dyn Platform>,
) {
    for (name, kind, interval, required) in SOURCES {
        manager
            .register(
                name,
                factory(Arc::clone(bus), Arc::clone(&platform), *kind),
                *interval,
                *required,
            )
            .await;
    }
}

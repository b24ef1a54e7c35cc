//! The seam to the host platform.
//!
//! Metric extraction and command execution live outside this crate; a
//! platform integration implements [`Platform`] plus the controller traits
//! and is wired in at startup. The built-in [`NullPlatform`] produces
//! empty snapshots and rejects control operations, which keeps the fabric
//! fully functional on hosts without any integration installed.

use async_trait::async_trait;
use sentra_core::control::{
    ArrayControl, ContainerControl, Controllers, DiskControl, Notifier, ServiceControl,
    SystemControl, VmControl,
};
use sentra_core::{CoreError, Result};
use sentra_model::records::{
    ArrayStatus, ContainerInfo, DiskInfo, GpuInfo, NotificationInfo, ShareInfo, SystemSample,
    VmInfo, ZfsPoolInfo,
};
use sentra_model::{InterfaceInfo, UpsStatus};
use std::sync::Arc;
use tracing::info;

/// Read-side platform interface: one method per collector.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn system(&self) -> Result<SystemSample>;
    async fn array(&self) -> Result<ArrayStatus>;
    async fn disks(&self) -> Result<Vec<DiskInfo>>;
    async fn containers(&self) -> Result<Vec<ContainerInfo>>;
    async fn vms(&self) -> Result<Vec<VmInfo>>;
    async fn gpus(&self) -> Result<Vec<GpuInfo>>;
    async fn interfaces(&self) -> Result<Vec<InterfaceInfo>>;
    async fn shares(&self) -> Result<Vec<ShareInfo>>;
    async fn zfs_pools(&self) -> Result<Vec<ZfsPoolInfo>>;
    async fn ups(&self) -> Result<UpsStatus>;
    async fn notifications(&self) -> Result<Vec<NotificationInfo>>;
}

/// Placeholder used when no platform integration is compiled in.
#[derive(Debug, Default)]
pub struct NullPlatform;

#[async_trait]
impl Platform for NullPlatform {
    async fn system(&self) -> Result<SystemSample> {
        Ok(SystemSample::default())
    }
    async fn array(&self) -> Result<ArrayStatus> {
        Ok(ArrayStatus::default())
    }
    async fn disks(&self) -> Result<Vec<DiskInfo>> {
        Ok(Vec::new())
    }
    async fn containers(&self) -> Result<Vec<ContainerInfo>> {
        Ok(Vec::new())
    }
    async fn vms(&self) -> Result<Vec<VmInfo>> {
        Ok(Vec::new())
    }
    async fn gpus(&self) -> Result<Vec<GpuInfo>> {
        Ok(Vec::new())
    }
    async fn interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        Ok(Vec::new())
    }
    async fn shares(&self) -> Result<Vec<ShareInfo>> {
        Ok(Vec::new())
    }
    async fn zfs_pools(&self) -> Result<Vec<ZfsPoolInfo>> {
        Ok(Vec::new())
    }
    async fn ups(&self) -> Result<UpsStatus> {
        Ok(UpsStatus::default())
    }
    async fn notifications(&self) -> Result<Vec<NotificationInfo>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl ContainerControl for NullPlatform {
    async fn start(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("container control"))
    }
    async fn stop(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("container control"))
    }
    async fn restart(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("container control"))
    }
    async fn pause(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("container control"))
    }
    async fn unpause(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("container control"))
    }
}

#[async_trait]
impl VmControl for NullPlatform {
    async fn start(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("vm control"))
    }
    async fn stop(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("vm control"))
    }
    async fn restart(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("vm control"))
    }
    async fn pause(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("vm control"))
    }
    async fn resume(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("vm control"))
    }
    async fn hibernate(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("vm control"))
    }
    async fn force_stop(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("vm control"))
    }
}

#[async_trait]
impl ArrayControl for NullPlatform {
    async fn start(&self) -> Result<()> {
        Err(CoreError::Unsupported("array control"))
    }
    async fn stop(&self) -> Result<()> {
        Err(CoreError::Unsupported("array control"))
    }
    async fn parity_start(&self) -> Result<()> {
        Err(CoreError::Unsupported("array control"))
    }
    async fn parity_stop(&self) -> Result<()> {
        Err(CoreError::Unsupported("array control"))
    }
    async fn parity_pause(&self) -> Result<()> {
        Err(CoreError::Unsupported("array control"))
    }
    async fn parity_resume(&self) -> Result<()> {
        Err(CoreError::Unsupported("array control"))
    }
}

#[async_trait]
impl DiskControl for NullPlatform {
    async fn spin_up(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("disk control"))
    }
    async fn spin_down(&self, _name: &str) -> Result<()> {
        Err(CoreError::Unsupported("disk control"))
    }
}

#[async_trait]
impl ServiceControl for NullPlatform {
    async fn set_enabled(&self, _name: &str, _enabled: bool) -> Result<()> {
        Err(CoreError::Unsupported("service control"))
    }
}

#[async_trait]
impl SystemControl for NullPlatform {
    async fn reboot(&self) -> Result<()> {
        Err(CoreError::Unsupported("system control"))
    }
    async fn shutdown(&self) -> Result<()> {
        Err(CoreError::Unsupported("system control"))
    }
}

#[async_trait]
impl Notifier for NullPlatform {
    async fn notify(&self, importance: &str, subject: &str, message: &str) -> Result<()> {
        // Without a host notification interface the notification is still
        // visible in the logs.
        info!(importance, subject, message, "notification");
        Ok(())
    }
    async fn archive_all(&self) -> Result<()> {
        Err(CoreError::Unsupported("notification archive"))
    }
}

/// Controller bundle backed by a single platform implementation.
pub fn controllers_from(platform: Arc<NullPlatform>) -> Controllers {
    Controllers {
        containers: Arc::clone(&platform) as _,
        vms: Arc::clone(&platform) as _,
        array: Arc::clone(&platform) as _,
        disks: Arc::clone(&platform) as _,
        services: Arc::clone(&platform) as _,
        system: Arc::clone(&platform) as _,
        notifier: platform as _,
    }
}

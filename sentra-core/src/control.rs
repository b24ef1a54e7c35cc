//! Controller seams for the opaque platform collaborators.
//!
//! The fabric never talks to Docker, libvirt or the array directly; side
//! effects flow through these traits. The server wires real integrations
//! (or its null placeholders) into a [`Controllers`] bundle shared by the
//! MQTT command router, the watchdog and the alert channels.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait ContainerControl: Send + Sync {
    async fn start(&self, name: &str) -> Result<()>;
    async fn stop(&self, name: &str) -> Result<()>;
    async fn restart(&self, name: &str) -> Result<()>;
    async fn pause(&self, name: &str) -> Result<()>;
    async fn unpause(&self, name: &str) -> Result<()>;
}

#[async_trait]
pub trait VmControl: Send + Sync {
    async fn start(&self, name: &str) -> Result<()>;
    async fn stop(&self, name: &str) -> Result<()>;
    async fn restart(&self, name: &str) -> Result<()>;
    async fn pause(&self, name: &str) -> Result<()>;
    async fn resume(&self, name: &str) -> Result<()>;
    async fn hibernate(&self, name: &str) -> Result<()>;
    async fn force_stop(&self, name: &str) -> Result<()>;
}

#[async_trait]
pub trait ArrayControl: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn parity_start(&self) -> Result<()>;
    async fn parity_stop(&self) -> Result<()>;
    async fn parity_pause(&self) -> Result<()>;
    async fn parity_resume(&self) -> Result<()>;
}

#[async_trait]
pub trait DiskControl: Send + Sync {
    async fn spin_up(&self, name: &str) -> Result<()>;
    async fn spin_down(&self, name: &str) -> Result<()>;
}

#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()>;
}

#[async_trait]
pub trait SystemControl: Send + Sync {
    async fn reboot(&self) -> Result<()>;
    async fn shutdown(&self) -> Result<()>;
}

/// The host notification interface: local notifications plus the
/// archive-all maintenance operation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, importance: &str, subject: &str, message: &str) -> Result<()>;
    async fn archive_all(&self) -> Result<()>;
}

/// Bundle handed to command consumers. Cloning is cheap (all `Arc`s).
#[derive(Clone)]
pub struct Controllers {
    pub containers: std::sync::Arc<dyn ContainerControl>,
    pub vms: std::sync::Arc<dyn VmControl>,
    pub array: std::sync::Arc<dyn ArrayControl>,
    pub disks: std::sync::Arc<dyn DiskControl>,
    pub services: std::sync::Arc<dyn ServiceControl>,
    pub system: std::sync::Arc<dyn SystemControl>,
    pub notifier: std::sync::Arc<dyn Notifier>,
}

impl std::fmt::Debug for Controllers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controllers").finish_non_exhaustive()
    }
}

//! Inbound MQTT command routing.
//!
//! Commands arrive on `<prefix>/cmd/...`; the sub-path selects the typed
//! controller operation and the payload carries the argument where one is
//! needed (`ON`/`OFF` for the `set` endpoints).

use sentra_core::control::Controllers;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ContainerSet { name: String, on: bool },
    ContainerRestart { name: String },
    ContainerPause { name: String },
    ContainerUnpause { name: String },
    VmSet { name: String, on: bool },
    VmRestart { name: String },
    VmPause { name: String },
    VmResume { name: String },
    VmHibernate { name: String },
    VmForceStop { name: String },
    ArraySet { on: bool },
    ParityStart,
    ParityStop,
    ParityPause,
    ParityResume,
    DiskSpinUp { name: String },
    DiskSpinDown { name: String },
    ServiceSet { name: String, on: bool },
    SystemReboot,
    SystemShutdown,
    NotificationsArchiveAll,
}

fn parse_on_off(payload: &str) -> Result<bool, String> {
    match payload.trim().to_ascii_uppercase().as_str() {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        other => Err(format!("expected ON or OFF, got {other:?}")),
    }
}

/// Parse the command sub-path (everything after `<prefix>/cmd/`) plus its
/// payload into a typed command.
pub fn parse(path: &str, payload: &str) -> Result<Command, String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let unknown = || format!("unknown command path {path:?}");

    match segments.as_slice() {
        ["docker", name, "set"] => Ok(Command::ContainerSet {
            name: name.to_string(),
            on: parse_on_off(payload)?,
        }),
        ["docker", name, "restart"] => Ok(Command::ContainerRestart {
            name: name.to_string(),
        }),
        ["docker", name, "pause"] => Ok(Command::ContainerPause {
            name: name.to_string(),
        }),
        ["docker", name, "unpause"] => Ok(Command::ContainerUnpause {
            name: name.to_string(),
        }),
        ["vm", name, "set"] => Ok(Command::VmSet {
            name: name.to_string(),
            on: parse_on_off(payload)?,
        }),
        ["vm", name, "restart"] => Ok(Command::VmRestart {
            name: name.to_string(),
        }),
        ["vm", name, "pause"] => Ok(Command::VmPause {
            name: name.to_string(),
        }),
        ["vm", name, "resume"] => Ok(Command::VmResume {
            name: name.to_string(),
        }),
        ["vm", name, "hibernate"] => Ok(Command::VmHibernate {
            name: name.to_string(),
        }),
        ["vm", name, "force_stop"] => Ok(Command::VmForceStop {
            name: name.to_string(),
        }),
        ["array", "set"] => Ok(Command::ArraySet {
            on: parse_on_off(payload)?,
        }),
        ["array", "parity", "start"] => Ok(Command::ParityStart),
        ["array", "parity", "stop"] => Ok(Command::ParityStop),
        ["array", "parity", "pause"] => Ok(Command::ParityPause),
        ["array", "parity", "resume"] => Ok(Command::ParityResume),
        ["disk", name, "spin_up"] => Ok(Command::DiskSpinUp {
            name: name.to_string(),
        }),
        ["disk", name, "spin_down"] => Ok(Command::DiskSpinDown {
            name: name.to_string(),
        }),
        ["service", name, "set"] => Ok(Command::ServiceSet {
            name: name.to_string(),
            on: parse_on_off(payload)?,
        }),
        ["system", "reboot"] => Ok(Command::SystemReboot),
        ["system", "shutdown"] => Ok(Command::SystemShutdown),
        ["notifications", "archive_all"] => Ok(Command::NotificationsArchiveAll),
        _ => Err(unknown()),
    }
}

/// Execute a parsed command against the controller bundle.
pub async fn dispatch(command: Command, controllers: &Controllers) -> sentra_core::Result<()> {
    match command {
        Command::ContainerSet { name, on: true } => controllers.containers.start(&name).await,
        Command::ContainerSet { name, on: false } => controllers.containers.stop(&name).await,
        Command::ContainerRestart { name } => controllers.containers.restart(&name).await,
        Command::ContainerPause { name } => controllers.containers.pause(&name).await,
        Command::ContainerUnpause { name } => controllers.containers.unpause(&name).await,
        Command::VmSet { name, on: true } => controllers.vms.start(&name).await,
        Command::VmSet { name, on: false } => controllers.vms.stop(&name).await,
        Command::VmRestart { name } => controllers.vms.restart(&name).await,
        Command::VmPause { name } => controllers.vms.pause(&name).await,
        Command::VmResume { name } => controllers.vms.resume(&name).await,
        Command::VmHibernate { name } => controllers.vms.hibernate(&name).await,
        Command::VmForceStop { name } => controllers.vms.force_stop(&name).await,
        Command::ArraySet { on: true } => controllers.array.start().await,
        Command::ArraySet { on: false } => controllers.array.stop().await,
        Command::ParityStart => controllers.array.parity_start().await,
        Command::ParityStop => controllers.array.parity_stop().await,
        Command::ParityPause => controllers.array.parity_pause().await,
        Command::ParityResume => controllers.array.parity_resume().await,
        Command::DiskSpinUp { name } => controllers.disks.spin_up(&name).await,
        Command::DiskSpinDown { name } => controllers.disks.spin_down(&name).await,
        Command::ServiceSet { name, on } => controllers.services.set_enabled(&name, on).await,
        Command::SystemReboot => controllers.system.reboot().await,
        Command::SystemShutdown => controllers.system.shutdown().await,
        Command::NotificationsArchiveAll => controllers.notifier.archive_all().await,
    }
}

//! The flat evaluation environment built from the snapshot cache.

use sentra_model::records::Payload;
use sentra_model::topics;
use serde::Serialize;

use crate::cache::SnapshotCache;

use super::expr::{FieldSource, Value};

/// One row of host state, rebuilt each evaluation tick. Fields that have
/// never been published evaluate to their zero value (or the empty
/// string), so rules degrade predictably on a cold cache.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvalContext {
    pub cpu: f64,
    pub ram_used_pct: f64,
    pub array_state: String,
    pub parity_valid: bool,
    pub container_count: u64,
    pub running_containers: u64,
    pub max_disk_temp: f64,
    pub total_disk_errors: u64,
    pub ups_status: String,
    pub ups_battery_charge: f64,
    pub uptime_secs: u64,
}

impl EvalContext {
    pub fn from_cache(cache: &SnapshotCache) -> Self {
        let mut ctx = Self::default();

        if let Some(record) = cache.latest(topics::SYSTEM) {
            if let Payload::System(sample) = &record.payload {
                ctx.cpu = sample.cpu_usage_pct;
                ctx.ram_used_pct = sample.ram_used_pct;
                ctx.uptime_secs = sample.uptime_secs;
            }
        }
        if let Some(record) = cache.latest(topics::ARRAY) {
            if let Payload::Array(array) = &record.payload {
                ctx.array_state = array.state.clone();
                ctx.parity_valid = array.parity_valid;
            }
        }
        if let Some(record) = cache.latest(topics::CONTAINERS) {
            if let Payload::Containers(containers) = &record.payload {
                ctx.container_count = containers.len() as u64;
                ctx.running_containers =
                    containers.iter().filter(|c| c.is_running()).count() as u64;
            }
        }
        if let Some(record) = cache.latest(topics::DISKS) {
            if let Payload::Disks(disks) = &record.payload {
                ctx.max_disk_temp = disks
                    .iter()
                    .filter_map(|d| d.temp_c)
                    .fold(0.0_f64, f64::max);
                ctx.total_disk_errors = disks.iter().map(|d| d.smart_errors).sum();
            }
        }
        if let Some(record) = cache.latest(topics::UPS) {
            if let Payload::Ups(ups) = &record.payload {
                ctx.ups_status = ups.status.clone();
                ctx.ups_battery_charge = ups.battery_charge_pct;
            }
        }
        ctx
    }
}

impl FieldSource for EvalContext {
    fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "CPU" => Value::Num(self.cpu),
            "RAMUsedPct" => Value::Num(self.ram_used_pct),
            "ArrayState" => Value::Str(self.array_state.clone()),
            "ParityValid" => Value::Bool(self.parity_valid),
            "ContainerCount" => Value::Num(self.container_count as f64),
            "RunningContainers" => Value::Num(self.running_containers as f64),
            "MaxDiskTemp" => Value::Num(self.max_disk_temp),
            "TotalDiskErrors" => Value::Num(self.total_disk_errors as f64),
            "UPSStatus" => Value::Str(self.ups_status.clone()),
            "UPSBatteryCharge" => Value::Num(self.ups_battery_charge),
            "UptimeSecs" => Value::Num(self.uptime_secs as f64),
            _ => return None,
        };
        Some(value)
    }
}

//! Shared application state handed to every handler.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sentra_core::{
    AlertEngine, AlertRuleStore, CollectorManager, EventBus, HealthCheckStore, Watchdog,
};

use crate::config::Config;
use crate::mqtt::MqttPublisher;
use crate::ws::hub::WsHub;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub bus: Arc<EventBus>,
    pub collectors: Arc<CollectorManager>,
    pub watchdog: Arc<Watchdog>,
    pub alerts: Arc<AlertEngine>,
    pub rule_store: Arc<AlertRuleStore>,
    pub check_store: Arc<HealthCheckStore>,
    pub hub: Arc<WsHub>,
    pub mqtt: Arc<MqttPublisher>,
    pub started_at: DateTime<Utc>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

//! Server configuration loaded via environment variables (a `.env` file is
//! honoured when present). CLI arguments override individual fields.

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    /// Directory holding `alerts.json` and `healthchecks.json`.
    pub config_dir: PathBuf,

    /// Host name used in WebSocket frames and MQTT discovery identifiers.
    pub hostname: String,

    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    /// Topic prefix for all published state and inbound commands.
    pub prefix: String,
    /// Home-Assistant discovery on/off.
    pub ha_discovery: bool,
    pub ha_prefix: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        Ok(Self {
            server_host: env::var("SENTRA_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SENTRA_PORT")
                .unwrap_or_else(|_| "8043".to_string())
                .parse()
                .context("SENTRA_PORT must be a port number")?,
            config_dir: env::var("SENTRA_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/var/lib/sentra")),
            hostname: env::var("SENTRA_HOSTNAME")
                .or_else(|_| env::var("HOSTNAME"))
                .unwrap_or_else(|_| "sentra".to_string()),
            mqtt: MqttConfig::from_env()?,
        })
    }
}

impl MqttConfig {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            enabled: env::var("MQTT_ENABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            host: env::var("MQTT_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("MQTT_PORT")
                .unwrap_or_else(|_| "1883".to_string())
                .parse()
                .context("MQTT_PORT must be a port number")?,
            username: env::var("MQTT_USERNAME").ok(),
            password: env::var("MQTT_PASSWORD").ok(),
            client_id: env::var("MQTT_CLIENT_ID").unwrap_or_else(|_| "sentra".to_string()),
            prefix: env::var("MQTT_TOPIC_PREFIX").unwrap_or_else(|_| "unraid".to_string()),
            ha_discovery: env::var("MQTT_HA_DISCOVERY")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            ha_prefix: env::var("MQTT_HA_PREFIX").unwrap_or_else(|_| "homeassistant".to_string()),
        })
    }

    pub fn availability_topic(&self) -> String {
        format!("{}/availability", self.prefix)
    }

    pub fn command_filter(&self) -> String {
        format!("{}/cmd/#", self.prefix)
    }
}

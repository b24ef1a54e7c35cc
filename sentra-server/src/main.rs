//! # Sentra Server
//!
//! Long-running agent exposing the live state of a NAS-style host.
//!
//! ## Overview
//!
//! Collectors publish typed records onto an in-process event bus; a
//! snapshot cache retains the latest record per topic. Consumers fan the
//! stream out:
//!
//! - **WebSocket**: framed JSON events with heartbeat and slow-consumer
//!   eviction
//! - **MQTT**: retained state topics, Home-Assistant discovery, inbound
//!   command routing
//! - **REST**: cache read-through plus collector/health-check/alert-rule
//!   management
//!
//! A watchdog runs configured health probes with cooldown-gated
//! remediation, and an alert engine evaluates user expressions against the
//! cached snapshot.

/// REST routes
pub mod api;

/// Server config
pub mod config;

/// Error types and handling
pub mod errors;

/// MQTT publisher, discovery and command routing
pub mod mqtt;

/// Platform seam and null implementation
pub mod platform;

/// Collector registration glue
pub mod sources;

/// Shared application state
pub mod state;

/// WebSocket hub and connection handling
pub mod ws;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sentra_core::store::{alert_rules_path, health_checks_path};
use sentra_core::{
    AlertEngine, AlertRuleStore, CollectorManager, EventBus, HealthCheckStore, Watchdog,
};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::mqtt::MqttPublisher;
use crate::platform::NullPlatform;
use crate::state::AppState;
use crate::ws::hub::WsHub;

/// Command line arguments for the Sentra agent
#[derive(Parser, Debug)]
#[command(name = "sentra-server")]
#[command(about = "NAS host agent exposing live state over WebSocket, MQTT and REST")]
struct Args {
    /// Server port (overrides config)
    #[arg(short, long, env = "SENTRA_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SENTRA_HOST")]
    host: Option<String>,

    /// Directory for alert/health-check stores (overrides config)
    #[arg(long, env = "SENTRA_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.server_port = port;
    }
    if let Some(host) = args.host {
        config.server_host = host;
    }
    if let Some(config_dir) = args.config_dir {
        config.config_dir = config_dir;
    }
    let config = Arc::new(config);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentra=info,sentra_core=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(host = %config.server_host, port = config.server_port, "configuration loaded");

    // Process-wide cancellation scope; components run under child tokens
    // and register with the tracker so shutdown can join them.
    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();

    let bus = EventBus::new();

    let rule_store = Arc::new(AlertRuleStore::open(alert_rules_path(&config.config_dir))?);
    let check_store = Arc::new(HealthCheckStore::open(health_checks_path(
        &config.config_dir,
    ))?);

    let platform = Arc::new(NullPlatform);
    let controllers = platform::controllers_from(Arc::clone(&platform));

    let collectors = Arc::new(CollectorManager::new(
        Arc::clone(&bus),
        shutdown.clone(),
    ));
    sources::register_all(&collectors, &bus, platform).await;
    let started = collectors.start_all().await;
    info!(count = started, "collectors running");

    let watchdog = Watchdog::new(
        Arc::clone(&check_store),
        Arc::clone(&bus),
        Arc::clone(&controllers.containers),
        Arc::clone(&controllers.notifier),
    );
    tracker.spawn(Arc::clone(&watchdog).run(shutdown.child_token()));

    let alerts = Arc::new(AlertEngine::new(
        Arc::clone(&rule_store),
        Arc::clone(&bus),
        Arc::clone(&controllers.notifier),
    ));
    {
        let alerts = Arc::clone(&alerts);
        let token = shutdown.child_token();
        tracker.spawn(async move { alerts.run(token).await });
    }

    let hub = WsHub::new();
    hub.spawn_forwarders(&bus, shutdown.child_token(), &tracker);

    let mqtt = MqttPublisher::new(
        config.mqtt.clone(),
        config.hostname.clone(),
        Arc::clone(&bus),
        controllers,
    );
    tracker.spawn(Arc::clone(&mqtt).run(shutdown.child_token(), tracker.clone()));

    let app_state = AppState {
        config: Arc::clone(&config),
        bus,
        collectors: Arc::clone(&collectors),
        watchdog,
        alerts,
        rule_store,
        check_store,
        hub,
        mqtt,
        started_at: chrono::Utc::now(),
    };

    let app = api::router(app_state);
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // The signal already cancelled the scope; collectors are joined
    // explicitly, everything else drains through the tracker.
    collectors.stop_all().await;
    tracker.close();
    tracker.wait().await;
    info!("shutdown complete");

    Ok(())
}

/// Completes on SIGINT/SIGTERM and fires the process-wide cancellation
/// scope.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
    shutdown.cancel();
}

//! Probe implementations for the watchdog.
//!
//! Probes return `Ok(())` or a human-readable failure reason; the caller
//! owns all state handling. HTTP bodies are discarded.

use std::time::Duration;

use sentra_model::records::Payload;
use sentra_model::topics;
use sentra_model::{HealthCheck, HealthCheckKind};
use tokio::net::TcpStream;

use crate::cache::SnapshotCache;

pub(crate) async fn run(
    http: &reqwest::Client,
    cache: &SnapshotCache,
    check: &HealthCheck,
) -> Result<(), String> {
    let timeout = Duration::from_secs(check.timeout_secs.max(1));
    match check.kind {
        HealthCheckKind::Http => {
            http_probe(http, &check.target, timeout, check.success_code.unwrap_or(200)).await
        }
        HealthCheckKind::Tcp => tcp_probe(&check.target, timeout).await,
        HealthCheckKind::Container => container_probe(cache, &check.target),
        // No raw-socket ICMP without privileges; ping targets are dialed
        // as TCP, port 80 when none is given.
        HealthCheckKind::Ping => {
            let target = if check.target.contains(':') {
                check.target.clone()
            } else {
                format!("{}:80", check.target)
            };
            tcp_probe(&target, timeout).await
        }
    }
}

async fn http_probe(
    client: &reqwest::Client,
    target: &str,
    timeout: Duration,
    expected: u16,
) -> Result<(), String> {
    let response = client
        .get(target)
        .timeout(timeout)
        .send()
        .await
        .map_err(|err| err.to_string())?;
    let status = response.status().as_u16();
    if status == expected {
        Ok(())
    } else {
        Err(format!("status {status} (expected {expected})"))
    }
}

async fn tcp_probe(target: &str, timeout: Duration) -> Result<(), String> {
    if !target.contains(':') {
        return Err(format!("target {target:?} must be host:port"));
    }
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(format!("connect to {target} timed out")),
    }
}

fn container_probe(cache: &SnapshotCache, target: &str) -> Result<(), String> {
    let record = cache
        .latest(topics::CONTAINERS)
        .ok_or_else(|| "container snapshot unavailable".to_string())?;
    let containers = match &record.payload {
        Payload::Containers(containers) => containers,
        _ => return Err("container snapshot unavailable".to_string()),
    };
    let found = containers
        .iter()
        .find(|c| c.id == target || c.name == target)
        .ok_or_else(|| "not found".to_string())?;
    if found.is_running() {
        Ok(())
    } else {
        Err(format!("state {} (expected running)", found.state))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::routing::get;
    use axum::Router;
    use sentra_model::records::{ContainerInfo, Record};

    use super::*;

    async fn serve(status: u16) -> String {
        let app = Router::new().route(
            "/",
            get(move || async move { axum::http::StatusCode::from_u16(status).unwrap() }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_http_probe_matches_success_code() {
        let client = reqwest::Client::new();
        let url = serve(202).await;
        // Explicit success code honored.
        assert!(
            http_probe(&client, &url, Duration::from_secs(5), 202)
                .await
                .is_ok()
        );
        // Default 200 fails against a 202 responder.
        let err = http_probe(&client, &url, Duration::from_secs(5), 200)
            .await
            .unwrap_err();
        assert_eq!(err, "status 202 (expected 200)");
    }

    #[tokio::test]
    async fn test_http_probe_failure_status() {
        let client = reqwest::Client::new();
        let url = serve(500).await;
        let err = http_probe(&client, &url, Duration::from_secs(5), 200)
            .await
            .unwrap_err();
        assert_eq!(err, "status 500 (expected 200)");
    }

    #[tokio::test]
    async fn test_tcp_probe_connects() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });
        assert!(tcp_probe(&addr.to_string(), Duration::from_secs(5))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_tcp_probe_requires_port() {
        let err = tcp_probe("localhost", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.contains("host:port"));
    }

    #[test]
    fn test_container_probe_states() {
        let cache = SnapshotCache::new();
        assert_eq!(
            container_probe(&cache, "web").unwrap_err(),
            "container snapshot unavailable"
        );

        cache.store(Arc::new(Record::new(
            topics::CONTAINERS,
            Payload::Containers(vec![
                ContainerInfo {
                    id: "abc123".into(),
                    name: "web".into(),
                    state: "running".into(),
                    ..Default::default()
                },
                ContainerInfo {
                    id: "def456".into(),
                    name: "db".into(),
                    state: "exited".into(),
                    ..Default::default()
                },
            ]),
        )));

        assert!(container_probe(&cache, "web").is_ok());
        assert!(container_probe(&cache, "abc123").is_ok());
        assert_eq!(
            container_probe(&cache, "db").unwrap_err(),
            "state exited (expected running)"
        );
        assert_eq!(container_probe(&cache, "ghost").unwrap_err(), "not found");
    }
}

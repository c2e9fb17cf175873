//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::{extract::State, http::StatusCode, routing::any, Router};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use l7_balancer::config::schema::BackendConfig;
use l7_balancer::{HttpServer, ProxyConfig, Shutdown};

/// A mock backend that answers every request with its name and a
/// switchable status code.
pub struct MockBackend {
    pub addr: SocketAddr,
    status: Arc<AtomicU16>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }
}

/// Start a mock backend on an ephemeral port. The body is `name` followed by
/// the request path.
pub async fn start_mock_backend(name: &'static str) -> MockBackend {
    let status = Arc::new(AtomicU16::new(200));
    let app = Router::new()
        .route("/", any(respond))
        .route("/{*path}", any(respond))
        .with_state((name, status.clone()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockBackend { addr, status }
}

async fn respond(
    State((name, status)): State<(&'static str, Arc<AtomicU16>)>,
    uri: axum::http::Uri,
) -> (StatusCode, String) {
    let code = StatusCode::from_u16(status.load(Ordering::SeqCst)).unwrap();
    (code, format!("{} {}", name, uri.path()))
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Minimal config over `backends` with health checks disabled.
pub fn config_for(backends: &[String]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.balancer.backends = backends.iter().map(|b| BackendConfig::new(b.as_str())).collect();
    config.health_check.enabled = false;
    config.rate_limiter.enabled = false;
    config
}

/// A balancer running on an ephemeral port.
pub struct RunningBalancer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl RunningBalancer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn_balancer(config: ProxyConfig) -> RunningBalancer {
    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    RunningBalancer {
        addr,
        shutdown,
        handle,
    }
}

/// Fetch `url` and return status and body.
pub async fn fetch(client: &reqwest::Client, url: &str) -> (u16, String) {
    let response = client.get(url).send().await.unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}

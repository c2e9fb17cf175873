//! Active health checking against live backends.

mod common;

use common::*;
use l7_balancer::config::InitialHealth;
use std::time::Duration;

async fn wait_until<F>(mut check: F, limit: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

#[tokio::test]
async fn test_prober_evicts_and_restores_backend() {
    let a = start_mock_backend("a").await;
    let b = start_mock_backend("b").await;
    let mut config = config_for(&[a.url(), b.url()]);
    config.health_check.enabled = true;
    config.health_check.interval_secs = 2;
    config.health_check.timeout_secs = 1;

    let server = l7_balancer::HttpServer::new(config).unwrap();
    let backends = server.backends().clone();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = l7_balancer::Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/");

    b.set_status(503);
    let b_down = wait_until(
        || backends.list_backends().iter().any(|s| !s.state.is_selectable()),
        Duration::from_secs(6),
    )
    .await;
    assert!(b_down);
    for _ in 0..4 {
        assert_eq!(fetch(&client, &url).await, (200, "a /".to_string()));
    }

    b.set_status(200);
    let b_up = wait_until(
        || backends.list_backends().iter().all(|s| s.state.is_selectable()),
        Duration::from_secs(6),
    )
    .await;
    assert!(b_up);
    let mut bodies = Vec::new();
    for _ in 0..4 {
        bodies.push(fetch(&client, &url).await.1);
    }
    assert!(bodies.contains(&"b /".to_string()));

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_pessimistic_start_waits_for_first_probe() {
    let a = start_mock_backend("a").await;
    let mut config = config_for(&[a.url()]);
    config.health_check.enabled = true;
    config.health_check.interval_secs = 2;
    config.health_check.timeout_secs = 1;
    config.health_check.initial_state = InitialHealth::Pessimistic;

    let server = l7_balancer::HttpServer::new(config).unwrap();
    let backends = server.backends().clone();
    assert!(backends.next().is_err());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = l7_balancer::Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    assert!(wait_until(|| backends.next().is_ok(), Duration::from_secs(3)).await);
    let client = reqwest::Client::new();
    assert_eq!(fetch(&client, &format!("http://{addr}/ping")).await, (200, "a /ping".to_string()));

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

//! End-to-end request path: rotation, admission, passthrough, failure handling.

mod common;

use common::*;
use std::time::Duration;

#[tokio::test]
async fn test_round_robin_across_backends() {
    let a = start_mock_backend("a").await;
    let b = start_mock_backend("b").await;
    let c = start_mock_backend("c").await;
    let balancer = spawn_balancer(config_for(&[a.url(), b.url(), c.url()])).await;
    let client = reqwest::Client::new();

    let mut names = Vec::new();
    for _ in 0..6 {
        let (status, body) = fetch(&client, &balancer.url("/")).await;
        assert_eq!(status, 200);
        names.push(body.split(' ').next().unwrap().to_string());
    }
    assert_eq!(names, vec!["a", "b", "c", "a", "b", "c"]);
}

#[tokio::test]
async fn test_path_and_request_id_forwarded() {
    let a = start_mock_backend("a").await;
    let balancer = spawn_balancer(config_for(&[a.url()])).await;
    let client = reqwest::Client::new();

    let response = client.get(balancer.url("/users/42?x=1")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "a /users/42");
}

#[tokio::test]
async fn test_burst_over_capacity_gets_429() {
    let a = start_mock_backend("a").await;
    let b = start_mock_backend("b").await;
    let c = start_mock_backend("c").await;
    let mut config = config_for(&[a.url(), b.url(), c.url()]);
    config.rate_limiter.enabled = true;
    config.rate_limiter.default_limit.capacity = 2;
    config.rate_limiter.default_limit.rate_per_sec = 1;
    let balancer = spawn_balancer(config).await;
    let client = reqwest::Client::new();

    assert_eq!(fetch(&client, &balancer.url("/")).await.0, 200);
    assert_eq!(fetch(&client, &balancer.url("/")).await.0, 200);
    let (status, body) = fetch(&client, &balancer.url("/")).await;
    assert_eq!(status, 429);
    assert_eq!(body, "rate limit exceeded");

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(fetch(&client, &balancer.url("/")).await.0, 200);
}

#[tokio::test]
async fn test_backend_error_status_is_relayed() {
    let a = start_mock_backend("a").await;
    a.set_status(500);
    let balancer = spawn_balancer(config_for(&[a.url()])).await;
    let client = reqwest::Client::new();

    // 5xx answers are not transport failures: the backend stays in rotation
    for _ in 0..3 {
        let (status, body) = fetch(&client, &balancer.url("/")).await;
        assert_eq!(status, 500);
        assert_eq!(body, "a /");
    }
}

#[tokio::test]
async fn test_dead_backend_is_taken_out_of_rotation() {
    let a = start_mock_backend("a").await;
    let dead = format!("http://{}", closed_port().await);
    let balancer = spawn_balancer(config_for(&[a.url(), dead])).await;
    let client = reqwest::Client::new();

    assert_eq!(fetch(&client, &balancer.url("/")).await, (200, "a /".to_string()));
    assert_eq!(fetch(&client, &balancer.url("/")).await, (503, "service unavailable".to_string()));
    for _ in 0..5 {
        assert_eq!(fetch(&client, &balancer.url("/")).await.0, 200);
    }
}

#[tokio::test]
async fn test_all_backends_down_gets_503() {
    let dead = format!("http://{}", closed_port().await);
    let balancer = spawn_balancer(config_for(&[dead])).await;
    let client = reqwest::Client::new();

    assert_eq!(fetch(&client, &balancer.url("/")).await, (503, "service unavailable".to_string()));
    assert_eq!(fetch(&client, &balancer.url("/")).await, (503, "all backends are down".to_string()));
}

#[tokio::test]
async fn test_shutdown_returns_within_deadline() {
    let a = start_mock_backend("a").await;
    let mut config = config_for(&[a.url()]);
    config.health_check.enabled = true;
    config.rate_limiter.enabled = true;
    let balancer = spawn_balancer(config).await;
    let client = reqwest::Client::new();
    assert_eq!(fetch(&client, &balancer.url("/")).await.0, 200);

    balancer.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(10), balancer.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_stalled_backend_body_is_cut_off() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let stalled = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let stalled_addr = stalled.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = stalled.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nabc")
            .await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(socket);
    });

    let mut config = config_for(&[format!("http://{stalled_addr}")]);
    config.timeouts.write_secs = 1;
    let balancer = spawn_balancer(config).await;

    let response = reqwest::get(balancer.url("/")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body = tokio::time::timeout(Duration::from_secs(5), response.bytes()).await;
    assert!(matches!(body, Ok(Err(_))), "relayed body should fail instead of hanging");
}

#[tokio::test]
async fn test_idle_client_connection_is_closed() {
    use tokio::io::AsyncReadExt;

    let a = start_mock_backend("a").await;
    let mut config = config_for(&[a.url()]);
    config.timeouts.connect_secs = 1;
    config.timeouts.request_secs = 1;
    config.timeouts.idle_secs = 3;
    let balancer = spawn_balancer(config).await;

    let mut socket = tokio::net::TcpStream::connect(balancer.addr).await.unwrap();
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(6), socket.read(&mut buf)).await;
    // closed by the server: EOF or reset, but never still open
    assert!(matches!(read, Ok(Ok(0)) | Ok(Err(_))), "{read:?}");
}

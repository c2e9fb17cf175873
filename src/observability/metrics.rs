//! Metrics collection and exposition.
//!
//! # Metrics
//! - `lb_requests_total` (counter): requests by method, status, backend
//! - `lb_request_duration_seconds` (histogram): latency distribution
//! - `lb_backend_health` (gauge): 1=selectable, 0=failed
//! - `lb_health_probes_total` (counter): probe outcomes by backend
//! - `lb_rate_limited_total` (counter): requests rejected with 429
//! - `lb_rate_limiter_clients` (gauge): buckets currently tracked
//!
//! Without an installed recorder every call here is a no-op.

use metrics::{counter, gauge, histogram, Label};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    let labels = vec![
        Label::new("method", method.to_string()),
        Label::new("status", status.to_string()),
        Label::new("backend", backend.to_string()),
    ];
    counter!("lb_requests_total", labels.clone()).increment(1);
    histogram!("lb_request_duration_seconds", labels).record(start.elapsed().as_secs_f64());
}

pub fn record_backend_health(backend: &str, healthy: bool) {
    gauge!("lb_backend_health", "backend" => backend.to_string()).set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_probe(backend: &str, outcome: &'static str) {
    counter!("lb_health_probes_total", "backend" => backend.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_rate_limited() {
    counter!("lb_rate_limited_total").increment(1);
}

pub fn record_tracked_clients(count: usize) {
    gauge!("lb_rate_limiter_clients").set(count as f64);
}

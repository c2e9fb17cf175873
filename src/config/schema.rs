//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the load balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend set and selection algorithm.
    pub balancer: BalancerConfig,

    /// Per-client admission control.
    pub rate_limiter: RateLimiterConfig,

    /// Health probe settings.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Backend set and the algorithm used to pick from it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Selection algorithm name. Only "round_robin" is implemented;
    /// anything else falls back to it.
    pub algorithm: String,

    /// Upstream backends, in rotation order.
    pub backends: Vec<BackendConfig>,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            algorithm: "round_robin".to_string(),
            backends: Vec::new(),
        }
    }
}

/// A single upstream backend.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackendConfig {
    /// Backend URL (e.g., "http://10.0.0.5:3000").
    pub url: String,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// How the admission controller derives a client identity from the peer address.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientKeyMode {
    /// Peer IP only. All connections from one host share a bucket.
    #[default]
    Ip,
    /// Peer IP and source port. Each TCP connection gets its own bucket.
    IpPort,
}

/// Token bucket parameters.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitConfig {
    /// Maximum burst size in requests.
    pub capacity: u64,

    /// Steady-state refill rate in requests per second.
    pub rate_per_sec: u64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            rate_per_sec: 10,
        }
    }
}

/// A per-client override of the default limit.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClientLimitOverride {
    /// Client identity, in the form produced by `key_by`.
    pub client: String,
    pub capacity: u64,
    pub rate_per_sec: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Enable admission control.
    pub enabled: bool,

    /// Limit applied to clients without an override.
    pub default_limit: LimitConfig,

    /// Client identity derivation.
    pub key_by: ClientKeyMode,

    /// How often idle buckets are swept, in seconds.
    pub sweep_interval_secs: u64,

    /// Buckets idle for longer than this are evicted, in seconds.
    pub idle_retention_secs: u64,

    /// How long stopping the sweeper may wait for a running sweep, in seconds.
    pub stop_timeout_secs: u64,

    /// Static per-client limits.
    pub overrides: Vec<ClientLimitOverride>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_limit: LimitConfig::default(),
            key_by: ClientKeyMode::default(),
            sweep_interval_secs: 600,
            idle_retention_secs: 3600,
            stop_timeout_secs: 5,
            overrides: Vec::new(),
        }
    }
}

/// Health assumed for backends before their first probe completes.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InitialHealth {
    /// Backends take traffic until a probe fails.
    #[default]
    Optimistic,
    /// Backends take no traffic until a probe succeeds.
    Pessimistic,
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in seconds. Must be shorter than the interval.
    pub timeout_secs: u64,

    /// Path to probe. When unset the backend URL itself is probed.
    pub path: Option<String>,

    /// Upper bound on probes in flight during one round.
    pub max_concurrent_probes: usize,

    /// Startup policy.
    pub initial_state: InitialHealth,

    /// How long stopping the prober may wait for in-flight probes, in seconds.
    pub stop_timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            path: None,
            max_concurrent_probes: 16,
            initial_state: InitialHealth::default(),
            stop_timeout_secs: 5,
        }
    }
}

/// Timeout configuration for forwarded requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for a backend to produce response headers, in seconds.
    pub request_secs: u64,

    /// Longest gap allowed while reading a client's request body, in seconds.
    pub read_secs: u64,

    /// Longest gap allowed while relaying a backend's response body, in seconds.
    pub write_secs: u64,

    /// Client connections with no traffic for this long are closed, in seconds.
    pub idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            read_secs: 10,
            write_secs: 10,
            idle_secs: 120,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Deadline for draining open connections, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 5,
        }
    }
}

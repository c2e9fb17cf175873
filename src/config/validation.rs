//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that parse but cannot
//! work. Every problem is reported, not just the first.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::load_balancer::backend::Backend;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("balancer.backends must not be empty")]
    NoBackends,

    #[error("backend {url:?} is invalid: {reason}")]
    InvalidBackend { url: String, reason: String },

    #[error("{field} is not a socket address: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("health_check.timeout_secs ({timeout}) must be shorter than health_check.interval_secs ({interval})")]
    ProbeTimeoutTooLong { timeout: u64, interval: u64 },

    #[error("timeouts.idle_secs ({idle}) must exceed timeouts.connect_secs + timeouts.request_secs ({exchange})")]
    IdleTimeoutTooShort { idle: u64, exchange: u64 },
}

/// Check a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.balancer.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }
    for backend in &config.balancer.backends {
        if let Err(e) = Backend::parse(&backend.url) {
            errors.push(ValidationError::InvalidBackend {
                url: backend.url.clone(),
                reason: e.to_string(),
            });
        }
    }

    let limiter = &config.rate_limiter;
    if limiter.enabled {
        if limiter.default_limit.capacity == 0 {
            errors.push(ValidationError::Zero("rate_limiter.default_limit.capacity"));
        }
        if limiter.default_limit.rate_per_sec == 0 {
            errors.push(ValidationError::Zero("rate_limiter.default_limit.rate_per_sec"));
        }
        if limiter.sweep_interval_secs == 0 {
            errors.push(ValidationError::Zero("rate_limiter.sweep_interval_secs"));
        }
        if limiter.idle_retention_secs == 0 {
            errors.push(ValidationError::Zero("rate_limiter.idle_retention_secs"));
        }
        for o in &limiter.overrides {
            if o.capacity == 0 || o.rate_per_sec == 0 {
                errors.push(ValidationError::Zero("rate_limiter.overrides capacity/rate_per_sec"));
            }
        }
    }

    let health = &config.health_check;
    if health.enabled {
        if health.interval_secs == 0 {
            errors.push(ValidationError::Zero("health_check.interval_secs"));
        }
        if health.timeout_secs == 0 {
            errors.push(ValidationError::Zero("health_check.timeout_secs"));
        }
        if health.timeout_secs >= health.interval_secs {
            errors.push(ValidationError::ProbeTimeoutTooLong {
                timeout: health.timeout_secs,
                interval: health.interval_secs,
            });
        }
        if health.max_concurrent_probes == 0 {
            errors.push(ValidationError::Zero("health_check.max_concurrent_probes"));
        }
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.request_secs", timeouts.request_secs),
        ("timeouts.read_secs", timeouts.read_secs),
        ("timeouts.write_secs", timeouts.write_secs),
        ("timeouts.idle_secs", timeouts.idle_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }
    // a connection waiting on its backend must not be closed as idle
    let exchange = timeouts.connect_secs.saturating_add(timeouts.request_secs);
    if timeouts.idle_secs <= exchange {
        errors.push(ValidationError::IdleTimeoutTooShort {
            idle: timeouts.idle_secs,
            exchange,
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

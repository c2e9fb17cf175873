//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every backend, in parallel with bounded fan-out
//! - Feed outcomes into the router (mark failed / mark recovered)
//!
//! A probe succeeds iff a response arrives within the timeout with a 2xx or
//! 3xx status. Probes are independent: a slow backend only holds its own
//! permit.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use url::Url;

use crate::config::HealthCheckConfig;
use crate::lifecycle::PeriodicTask;
use crate::load_balancer::{Backend, Router};
use crate::observability::metrics;

/// Why a probe counted as a failure.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[source] hyper_util::client::legacy::Error),

    #[error("unhealthy status {0}")]
    Status(StatusCode),

    #[error("cannot build probe request: {0}")]
    InvalidTarget(String),
}

impl ProbeError {
    fn label(&self) -> &'static str {
        match self {
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Transport(_) => "transport",
            ProbeError::Status(_) => "status",
            ProbeError::InvalidTarget(_) => "invalid_target",
        }
    }
}

/// Outcome counts of one probing round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeRound {
    pub healthy: usize,
    pub failed: usize,
}

/// Periodic prober that drives backend health transitions.
pub struct HealthProber {
    router: Arc<Router>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
    permits: Arc<Semaphore>,
}

impl HealthProber {
    pub fn new(router: Arc<Router>, config: HealthCheckConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_probes.max(1)));

        Self {
            router,
            config,
            client,
            permits,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Start probing on a fixed interval. Consumes the prober, so it can only
    /// be started once; the returned task can only be stopped once.
    pub fn start(self) -> PeriodicTask {
        let interval = Duration::from_secs(self.config.interval_secs);
        tracing::info!(
            interval = ?interval,
            timeout = ?self.timeout(),
            path = ?self.config.path,
            backends = self.router.len(),
            "Health prober starting"
        );

        let prober = Arc::new(self);
        PeriodicTask::spawn("health-prober", interval, move || {
            let prober = prober.clone();
            async move {
                prober.probe_all().await;
            }
        })
    }

    /// Probe every backend once and apply the results.
    ///
    /// Returns when every probe of this round has finished or timed out.
    pub async fn probe_all(&self) -> ProbeRound {
        let mut probes = JoinSet::new();

        for status in self.router.list_backends() {
            let backend = status.backend;
            let router = self.router.clone();
            let client = self.client.clone();
            let permits = self.permits.clone();
            let target = probe_target(&backend, self.config.path.as_deref());
            let timeout = self.timeout();

            probes.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return false;
                };
                let outcome = match target {
                    Ok(url) => probe(&client, &url, timeout).await,
                    Err(e) => Err(e),
                };
                apply_outcome(&router, &backend, outcome)
            });
        }

        let mut round = ProbeRound::default();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(true) => round.healthy += 1,
                Ok(false) => round.failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "Health probe task failed");
                    round.failed += 1;
                }
            }
        }

        tracing::debug!(healthy = round.healthy, failed = round.failed, "Health probe round complete");
        round
    }
}

/// URL to probe for `backend`: the backend itself, or `path` resolved against it.
fn probe_target(backend: &Backend, path: Option<&str>) -> Result<Url, ProbeError> {
    match path {
        None => Ok(backend.url().clone()),
        Some(path) => backend
            .url()
            .join(path)
            .map_err(|e| ProbeError::InvalidTarget(e.to_string())),
    }
}

async fn probe(
    client: &Client<HttpConnector, Body>,
    url: &Url,
    timeout: Duration,
) -> Result<StatusCode, ProbeError> {
    let request = Request::get(url.as_str())
        .header(header::USER_AGENT, "l7-balancer-health-check")
        .body(Body::empty())
        .map_err(|e| ProbeError::InvalidTarget(e.to_string()))?;

    match time::timeout(timeout, client.request(request)).await {
        Ok(Ok(response)) => {
            let status = response.status();
            if status.is_success() || status.is_redirection() {
                Ok(status)
            } else {
                Err(ProbeError::Status(status))
            }
        }
        Ok(Err(e)) => Err(ProbeError::Transport(e)),
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

/// Push one probe outcome into the router. Returns whether the probe passed.
fn apply_outcome(router: &Router, backend: &Backend, outcome: Result<StatusCode, ProbeError>) -> bool {
    let address = backend.address();
    match outcome {
        Ok(status) => {
            if router.mark_recovered(backend) {
                tracing::info!(backend = %address, status = %status, "Backend healthy");
            }
            metrics::record_probe(address, "success");
            metrics::record_backend_health(address, true);
            true
        }
        Err(e) => {
            if router.mark_failed(backend) {
                tracing::warn!(backend = %address, error = %e, "Health check failed, backend marked down");
            } else {
                tracing::debug!(backend = %address, error = %e, "Health check failed");
            }
            metrics::record_probe(address, e.label());
            metrics::record_backend_health(address, false);
            false
        }
    }
}

//! Per-request pipeline.
//!
//! # Data Flow
//! ```text
//! request + peer address
//!     → admission (token bucket, when enabled)   ─ reject → 429
//!     → Router::next                             ─ none   → 503
//!     → Forwarder::forward
//!         ├─ response (any status) → relayed unchanged
//!         ├─ timeout / transport   → mark_failed, 503
//!         └─ client body failed    → 503, backend untouched
//! ```
//!
//! A request is attempted against exactly one backend; there is no retry.

use axum::body::Body;
use axum::http::{Request, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::config::ClientKeyMode;
use crate::http::forward::{ForwardError, Forwarder};
use crate::http::request::client_key;
use crate::load_balancer::{Router, RouterError};
use crate::observability::metrics;
use crate::security::RateLimiter;

/// Why a request did not receive a backend response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("rate limit exceeded for {client}")]
    RateLimitExceeded { client: String },

    #[error(transparent)]
    NoBackend(#[from] RouterError),

    #[error("forwarding to {backend} failed: {source}")]
    Forwarding {
        backend: String,
        #[source]
        source: ForwardError,
    },
}

/// Request dispatcher: admission, selection, forwarding, failure marking.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
    limiter: Option<Arc<RateLimiter>>,
    forwarder: Arc<dyn Forwarder>,
    key_by: ClientKeyMode,
}

impl Dispatcher {
    /// `limiter: None` disables admission control.
    pub fn new(
        router: Arc<Router>,
        limiter: Option<Arc<RateLimiter>>,
        forwarder: Arc<dyn Forwarder>,
        key_by: ClientKeyMode,
    ) -> Self {
        Self {
            router,
            limiter,
            forwarder,
            key_by,
        }
    }

    pub async fn dispatch(
        &self,
        peer: SocketAddr,
        request: Request<Body>,
    ) -> Result<Response<Body>, DispatchError> {
        let start = Instant::now();
        let method = request.method().to_string();

        if let Some(limiter) = &self.limiter {
            let client = client_key(self.key_by, peer);
            if !limiter.allow(&client) {
                tracing::warn!(client = %client, "Rate limit exceeded");
                metrics::record_rate_limited();
                metrics::record_request(&method, 429, "none", start);
                return Err(DispatchError::RateLimitExceeded { client });
            }
        }

        let backend = match self.router.next() {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!(error = %e, "No backend available");
                metrics::record_request(&method, 503, "none", start);
                return Err(e.into());
            }
        };

        tracing::debug!(
            backend = %backend,
            method = %method,
            path = %request.uri().path(),
            "Forwarding request"
        );

        match self.forwarder.forward(&backend, peer, request).await {
            Ok(response) => {
                metrics::record_request(&method, response.status().as_u16(), backend.address(), start);
                Ok(response)
            }
            Err(source) => {
                if source.is_transport() && self.router.mark_failed(&backend) {
                    tracing::warn!(backend = %backend, error = %source, "Backend marked down");
                    metrics::record_backend_health(backend.address(), false);
                } else if matches!(source, ForwardError::ClientAborted(_)) {
                    tracing::debug!(backend = %backend, error = %source, "Client request body failed");
                } else {
                    tracing::error!(backend = %backend, error = %source, "Upstream request failed");
                }
                metrics::record_request(&method, 503, backend.address(), start);
                Err(DispatchError::Forwarding {
                    backend: backend.address().to_string(),
                    source,
                })
            }
        }
    }
}

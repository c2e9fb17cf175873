//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build every subsystem from the validated config (router, limiter,
//!   forwarder, prober)
//! - Create the Axum router and wire up middleware (request ID, tracing,
//!   request and body timeouts)
//! - Close client connections that go idle
//! - Run the background tasks alongside the listener
//! - Shut down in order: prober, sweeper, then connection drain

use axum::{
    body::Body,
    serve::ListenerExt,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::future::IntoFuture;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::{RequestBodyTimeoutLayer, TimeoutLayer},
    trace::TraceLayer,
};
use tracing::Instrument;

use crate::config::loader::ConfigError;
use crate::config::validation::validate_config;
use crate::config::ProxyConfig;
use crate::health::{HealthProber, HealthState};
use crate::http::dispatcher::Dispatcher;
use crate::http::forward::HyperForwarder;
use crate::http::request::{request_id, MakeRequestUuid, X_REQUEST_ID};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::load_balancer::{Router as BackendRouter, RouterError};
use crate::net::IdleTimeoutListener;
use crate::security::RateLimiter;

/// Failure to assemble the server from its configuration.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot build backend router: {0}")]
    Router(#[from] RouterError),
}

/// HTTP front end of the balancer.
pub struct HttpServer {
    app: Router,
    config: ProxyConfig,
    backends: Arc<BackendRouter>,
    limiter: Option<Arc<RateLimiter>>,
    prober: Option<HealthProber>,
}

impl HttpServer {
    /// Build the server and all of its subsystems. Nothing is spawned yet.
    pub fn new(config: ProxyConfig) -> Result<Self, StartupError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let initial: HealthState = config.health_check.initial_state.into();
        let backends = Arc::new(BackendRouter::from_config(&config.balancer, initial)?);

        let limiter = config
            .rate_limiter
            .enabled
            .then(|| Arc::new(RateLimiter::from_config(&config.rate_limiter)));

        let prober = config
            .health_check
            .enabled
            .then(|| HealthProber::new(backends.clone(), config.health_check.clone()));

        let dispatcher = Dispatcher::new(
            backends.clone(),
            limiter.clone(),
            Arc::new(HyperForwarder::new(&config.timeouts)),
            config.rate_limiter.key_by,
        );

        let app = Self::build_router(&config, dispatcher);
        Ok(Self {
            app,
            config,
            backends,
            limiter,
            prober,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, dispatcher: Dispatcher) -> Router {
        // outer bound leaves room for the forwarder's own deadline to answer first
        let timeouts = &config.timeouts;
        let deadline = Duration::from_secs(timeouts.connect_secs.saturating_add(timeouts.request_secs));

        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(dispatcher)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(TimeoutLayer::new(deadline))
                    .layer(RequestBodyTimeoutLayer::new(Duration::from_secs(timeouts.read_secs))),
            )
    }

    /// The backend router, shared with the prober and the request path.
    pub fn backends(&self) -> &Arc<BackendRouter> {
        &self.backends
    }

    /// Serve on `listener` until `shutdown` fires, then shut down in order.
    ///
    /// Returns once the drain finished or its deadline passed.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> io::Result<()> {
        let Self {
            app,
            config,
            backends,
            limiter,
            prober,
        } = self;

        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = backends.len(),
            rate_limiting = limiter.is_some(),
            health_checks = prober.is_some(),
            "HTTP server starting"
        );

        let prober = prober.map(HealthProber::start);
        let sweeper = limiter
            .as_ref()
            .map(|l| l.start_sweeper(Duration::from_secs(config.rate_limiter.sweep_interval_secs)));

        let drain = Shutdown::new();
        let mut drain_signal = drain.subscribe();
        let listener = IdleTimeoutListener::new(listener, Duration::from_secs(config.timeouts.idle_secs))
            .tap_io(|_| {});
        let serve = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { drain_signal.recv().await })
            .into_future();
        let mut serve = std::pin::pin!(serve);

        let finished = tokio::select! {
            result = &mut serve => Some(result),
            _ = shutdown.recv() => None,
        };

        tracing::info!("HTTP server shutting down");
        if let Some(task) = prober {
            task.stop(Duration::from_secs(config.health_check.stop_timeout_secs)).await;
        }
        if let Some(task) = sweeper {
            task.stop(Duration::from_secs(config.rate_limiter.stop_timeout_secs)).await;
        }

        if let Some(result) = finished {
            tracing::error!("HTTP server stopped before shutdown was requested");
            return result;
        }

        drain.trigger();
        let deadline = Duration::from_secs(config.shutdown.drain_timeout_secs);
        match tokio::time::timeout(deadline, serve).await {
            Ok(result) => result?,
            Err(_) => tracing::warn!(deadline = ?deadline, "Drain deadline passed, dropping open connections"),
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler: every method and path goes through the dispatcher.
async fn proxy_handler(
    State(dispatcher): State<Dispatcher>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let span = tracing::info_span!(
        "request",
        request_id = %request_id(&request),
        method = %request.method(),
        path = %request.uri().path(),
        client = %peer,
    );

    match dispatcher.dispatch(peer, request).instrument(span).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    fn config(backends: &[&str]) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.balancer.backends = backends.iter().map(|b| BackendConfig::new(*b)).collect();
        config
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        assert!(matches!(
            HttpServer::new(config(&[])),
            Err(StartupError::Config(ConfigError::Validation(_)))
        ));
        assert!(HttpServer::new(config(&["ftp://10.0.0.1"])).is_err());
    }

    #[test]
    fn test_new_applies_startup_policy() {
        let mut cfg = config(&["http://10.0.0.1:3000", "http://10.0.0.2:3000"]);
        let server = HttpServer::new(cfg.clone()).unwrap();
        assert!(server.backends().next().is_ok());

        cfg.health_check.initial_state = crate::config::InitialHealth::Pessimistic;
        let server = HttpServer::new(cfg).unwrap();
        assert_eq!(server.backends().next().unwrap_err(), RouterError::AllBackendsDown);
    }

    #[tokio::test]
    async fn test_run_returns_after_shutdown() {
        let mut cfg = config(&["http://127.0.0.1:9"]);
        cfg.health_check.enabled = false;
        let server = HttpServer::new(cfg).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let shutdown = Shutdown::new();
        let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

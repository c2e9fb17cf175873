//! Forwarding primitive.
//!
//! # Responsibilities
//! - Rewrite the inbound request onto the chosen backend
//! - Perform the exchange within a deadline
//! - Separate transport failures from backend answers: any response,
//!   whatever its status, is a success here
//! - Keep failures of the client's own request body apart from backend
//!   transport failures
//! - Bound gaps in the relayed response body

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{uri::PathAndQuery, Request, Response, Uri, Version};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::error::Error as _;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tower_http::timeout::TimeoutBody;

use crate::config::schema::TimeoutConfig;
use crate::load_balancer::Backend;
use crate::security::headers::{append_forwarded_for, strip_hop_by_hop};

/// Failure to obtain a response from a backend.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[source] hyper_util::client::legacy::Error),

    #[error("client request body failed: {0}")]
    ClientAborted(#[source] hyper_util::client::legacy::Error),

    #[error("cannot build upstream request: {0}")]
    Request(String),
}

impl ForwardError {
    /// Whether the failure says something about the backend's health.
    pub fn is_transport(&self) -> bool {
        matches!(self, ForwardError::Timeout(_) | ForwardError::Transport(_))
    }

    fn from_client(e: hyper_util::client::legacy::Error) -> Self {
        if caused_by_request_body(&e) {
            ForwardError::ClientAborted(e)
        } else {
            ForwardError::Transport(e)
        }
    }
}

/// Whether hyper gave up because the body we were sending failed, rather
/// than because the backend connection did.
fn caused_by_request_body(e: &hyper_util::client::legacy::Error) -> bool {
    let mut source = e.source();
    while let Some(cause) = source {
        if let Some(e) = cause.downcast_ref::<hyper::Error>() {
            return e.is_user() || e.is_body_write_aborted();
        }
        source = cause.source();
    }
    false
}

/// Sends a client request to a backend and returns the backend's response.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        backend: &Backend,
        client: SocketAddr,
        request: Request<Body>,
    ) -> Result<Response<Body>, ForwardError>;
}

/// Forwarder over a pooled hyper client.
#[derive(Clone)]
pub struct HyperForwarder {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    body_timeout: Duration,
}

impl HyperForwarder {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            timeout: Duration::from_secs(timeouts.request_secs),
            body_timeout: Duration::from_secs(timeouts.write_secs),
        }
    }
}

#[async_trait]
impl Forwarder for HyperForwarder {
    async fn forward(
        &self,
        backend: &Backend,
        client: SocketAddr,
        request: Request<Body>,
    ) -> Result<Response<Body>, ForwardError> {
        let (mut parts, body) = request.into_parts();

        parts.uri = upstream_uri(backend, &parts.uri)?;
        // the pool speaks HTTP/1.1 to backends whatever the client used
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        append_forwarded_for(&mut parts.headers, client.ip());

        let request = Request::from_parts(parts, body);
        let response: Response<Incoming> = match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ForwardError::from_client(e)),
            Err(_) => return Err(ForwardError::Timeout(self.timeout)),
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(TimeoutBody::new(self.body_timeout, body))))
    }
}

/// Place `inbound`'s path and query under `backend`.
///
/// The backend's own path is a prefix joined with exactly one slash; when
/// both sides carry a query string they are concatenated with `&`.
pub fn upstream_uri(backend: &Backend, inbound: &Uri) -> Result<Uri, ForwardError> {
    let base = backend.url();
    let path = join_paths(base.path(), inbound.path());

    let query = match (base.query(), inbound.query()) {
        (Some(a), Some(b)) if !a.is_empty() => Some(format!("{a}&{b}")),
        (Some(a), None) => Some(a.to_string()),
        (_, b) => b.map(str::to_string),
    };

    let path_and_query = match query {
        Some(q) => format!("{path}?{q}"),
        None => path,
    };

    Uri::builder()
        .scheme(base.scheme())
        .authority(backend.authority())
        .path_and_query(
            path_and_query
                .parse::<PathAndQuery>()
                .map_err(|e| ForwardError::Request(e.to_string()))?,
        )
        .build()
        .map_err(|e| ForwardError::Request(e.to_string()))
}

fn join_paths(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{}{}", a, &b[1..]),
        (false, false) => format!("{}/{}", a, b),
        _ => format!("{}{}", a, b),
    }
}

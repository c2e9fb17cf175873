//! Request identity.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for correlation
//! - Derive the client identity used for admission control
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing; an ID supplied by
//!   the client is kept and propagated
//! - Client identity comes from the peer address only; forwarded-for
//!   headers are client-controlled and never trusted for it

use axum::http::{HeaderName, HeaderValue, Request};
use std::net::SocketAddr;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::config::ClientKeyMode;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates a fresh UUID v4 for every request without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Read the request ID set by the request-id layer.
pub fn request_id<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Identity under which `peer` is rate limited.
pub fn client_key(mode: ClientKeyMode, peer: SocketAddr) -> String {
    match mode {
        ClientKeyMode::Ip => peer.ip().to_string(),
        ClientKeyMode::IpPort => peer.to_string(),
    }
}

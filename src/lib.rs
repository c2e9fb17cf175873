//! Layer-7 HTTP load balancer library.
//!
//! Round-robin selection over a fixed backend set, active health probing,
//! and per-client token-bucket admission control.

pub mod config;
pub mod http;
pub mod health;
pub mod load_balancer;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;

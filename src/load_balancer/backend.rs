//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server by its normalized URL
//! - Provide the authority used to rewrite forwarded requests
//!
//! Health is not stored here. The router owns the health map so that a
//! backend handed out by `next()` stays a plain immutable value.

use std::sync::Arc;
use url::Url;

use crate::health::state::HealthState;
use crate::load_balancer::RouterError;

/// A single backend server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    url: Url,
    /// Normalized form of `url`, used as the backend's identity.
    address: String,
}

impl Backend {
    /// Parse and normalize a backend address.
    ///
    /// Only `http` backends are accepted; the address must name a host.
    /// Fragments are dropped, the rest (scheme, host, port, path, query)
    /// is kept.
    pub fn parse(raw: &str) -> Result<Self, RouterError> {
        let invalid = |reason: String| RouterError::InvalidAddress {
            address: raw.to_string(),
            reason,
        };

        let mut url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }
        url.set_fragment(None);

        let address = url.to_string();
        Ok(Self { url, address })
    }

    /// The backend's parsed URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The normalized address that identifies this backend.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// `host:port`, with the scheme's default port filled in.
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address)
    }
}

/// Point-in-time view of a backend and its health.
#[derive(Debug, Clone)]
pub struct BackendStatus {
    pub backend: Arc<Backend>,
    pub state: HealthState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_address() {
        let b = Backend::parse("  http://Example.COM:80").unwrap();
        assert_eq!(b.address(), "http://example.com/");
        assert_eq!(b.authority(), "example.com:80");

        let b = Backend::parse("http://10.0.0.1:3000/api#frag").unwrap();
        assert_eq!(b.address(), "http://10.0.0.1:3000/api");
        assert_eq!(b.authority(), "10.0.0.1:3000");
    }

    #[test]
    fn test_ipv6_authority() {
        let b = Backend::parse("http://[::1]:8081").unwrap();
        assert_eq!(b.authority(), "[::1]:8081");
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(matches!(
            Backend::parse("127.0.0.1:3000"),
            Err(RouterError::InvalidAddress { .. })
        ));
        assert!(Backend::parse("https://secure.example").is_err());
        assert!(Backend::parse("not a url").is_err());
        assert!(Backend::parse("").is_err());
    }
}

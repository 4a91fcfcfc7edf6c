//! Rate-limit key derivation.
//!
//! The key is computed once per request from static request attributes.
//! The client address comes from the `ConnectInfo` extension that axum
//! inserts when the server is started with connect info.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};

use crate::config::KeyStrategy;
use crate::security::rate_limit::RateLimitKey;

/// Placeholder key for requests without a known peer address.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derives the bucket a request counts against.
pub trait KeyExtractor: Send + Sync {
    fn extract(&self, request: &Request<Body>) -> RateLimitKey;
}

impl<F> KeyExtractor for F
where
    F: Fn(&Request<Body>) -> RateLimitKey + Send + Sync,
{
    fn extract(&self, request: &Request<Body>) -> RateLimitKey {
        self(request)
    }
}

/// Peer IP address of the request, if the transport recorded one.
pub fn client_ip(request: &Request<Body>) -> Option<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Keys by client network address.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientIpKey;

impl KeyExtractor for ClientIpKey {
    fn extract(&self, request: &Request<Body>) -> RateLimitKey {
        client_ip(request).unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
    }
}

/// Keys by client address and path, giving every route its own quota.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientIpAndPathKey;

impl KeyExtractor for ClientIpAndPathKey {
    fn extract(&self, request: &Request<Body>) -> RateLimitKey {
        let client = client_ip(request).unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
        format!("{}:{}", client, request.uri().path())
    }
}

/// Keys by a header value such as an API key, falling back to the address.
#[derive(Debug, Clone)]
pub struct HeaderKey {
    name: HeaderName,
}

impl HeaderKey {
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }
}

impl KeyExtractor for HeaderKey {
    fn extract(&self, request: &Request<Body>) -> RateLimitKey {
        match request.headers().get(&self.name).and_then(|v| v.to_str().ok()) {
            Some(value) if !value.is_empty() => format!("{}={}", self.name, value),
            _ => ClientIpKey.extract(request),
        }
    }
}

/// Shared, type-erased extractor.
#[derive(Clone)]
pub struct SharedKeyExtractor(Arc<dyn KeyExtractor>);

impl SharedKeyExtractor {
    pub fn new(extractor: impl KeyExtractor + 'static) -> Self {
        Self(Arc::new(extractor))
    }

    /// Build the extractor named by configuration.
    ///
    /// Header names are checked by config validation; an invalid one here
    /// falls back to the client address.
    pub fn from_strategy(strategy: &KeyStrategy) -> Self {
        match strategy {
            KeyStrategy::ClientIp => Self::new(ClientIpKey),
            KeyStrategy::ClientIpAndPath => Self::new(ClientIpAndPathKey),
            KeyStrategy::Header(name) => match HeaderName::from_bytes(name.as_bytes()) {
                Ok(name) => Self::new(HeaderKey::new(name)),
                Err(_) => {
                    tracing::warn!(header = %name, "Invalid rate-limit header name, keying by client address");
                    Self::new(ClientIpKey)
                }
            },
        }
    }

}

impl KeyExtractor for SharedKeyExtractor {
    fn extract(&self, request: &Request<Body>) -> RateLimitKey {
        self.0.extract(request)
    }
}

impl Default for SharedKeyExtractor {
    fn default() -> Self {
        Self::new(ClientIpKey)
    }
}

impl fmt::Debug for SharedKeyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedKeyExtractor").finish()
    }
}

//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use admission_gate::config::{LogFormat, LoggingConfig, Quota};
use admission_gate::observability::access_log::{AccessLogger, MemorySink};
use admission_gate::Shutdown;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::response::Response;

/// Access logger writing into memory.
///
/// Keep the returned `Shutdown` alive for as long as the logger is used.
pub fn memory_logger(format: LogFormat) -> (AccessLogger, MemorySink, Shutdown) {
    let shutdown = Shutdown::new();
    let sink = MemorySink::new();
    let config = LoggingConfig {
        format,
        ..LoggingConfig::default()
    };
    let (logger, _drain) = AccessLogger::spawn(&config, Box::new(sink.clone()), shutdown.subscribe());
    (logger, sink, shutdown)
}

pub fn quota(limit: u64, period_secs: u64) -> Quota {
    Quota::new(limit, Duration::from_secs(period_secs)).unwrap()
}

/// GET request coming from `peer`.
pub fn request_from(path: &str, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().unwrap();
    let mut req = Request::builder().uri(path).body(Body::empty()).unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

//! Admission pipeline tests driven through an axum router.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use admission_gate::clock::MockClock;
use admission_gate::config::{KeyStrategy, LogFormat, LoggingConfig, RateLimitConfig};
use admission_gate::http::request::{RequestContext, X_REQUEST_ID};
use admission_gate::http::response::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING};
use admission_gate::observability::{AccessDecision, AccessLogEntry, AccessLogger, LogSink};
use admission_gate::security::{ClientIpAndPathKey, FixedWindowLimiter};
use admission_gate::{admission_middleware, Admission, Shutdown};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::get;
use axum::{middleware, Extension, Router};
use tower::{Service, ServiceExt};
use tower_http::timeout::TimeoutLayer;

use common::{body_json, memory_logger, quota, request_from};

const PEER_A: &str = "10.0.0.1:40000";
const PEER_B: &str = "10.0.0.2:40000";

fn app(admission: Admission) -> Router {
    routes().layer(middleware::from_fn_with_state(
        Arc::new(admission),
        admission_middleware,
    ))
}

fn routes() -> Router {
    Router::new()
        .route(
            "/orders",
            get(|| async { Err::<&str, _>(StatusCode::SERVICE_UNAVAILABLE) }),
        )
        .route("/users", get(|| async { "users" }))
        .route("/health", get(|| async { "ok" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "late"
            }),
        )
        .route(
            "/context",
            get(|Extension(context): Extension<RequestContext>| async move {
                format!("{} {}", context.correlation_id, context.client_key)
            }),
        )
        .route(
            "/panic",
            get(|| async {
                if true {
                    panic!("handler exploded");
                }
                "unreachable"
            }),
        )
}

#[tokio::test]
async fn test_window_rejects_then_resets() {
    let (logger, sink, _shutdown) = memory_logger(LogFormat::Structured);
    let start = Instant::now();
    let clock = MockClock::new(start);
    let admission = Admission::new(FixedWindowLimiter::new(quota(3, 60)), logger.clone())
        .with_clock(clock.clone());
    let app = app(admission);

    for expected_remaining in ["2", "1", "0"] {
        let response = app.clone().oneshot(request_from("/users", PEER_A)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_RATELIMIT_LIMIT], "3");
        assert_eq!(response.headers()[X_RATELIMIT_REMAINING], expected_remaining);
        clock.advance(Duration::from_secs(1));
    }

    let response = app.clone().oneshot(request_from("/users", PEER_A)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "57");
    assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "0");
    assert!(response.headers().contains_key(X_REQUEST_ID));
    let body = body_json(response).await;
    assert_eq!(body["error"], "Rate limit exceeded");
    assert_eq!(body["retry_after_secs"], 57);

    // The window opened at t=0, so t=61 starts a fresh one.
    clock.set(start + Duration::from_secs(61));
    let response = app.clone().oneshot(request_from("/users", PEER_A)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "2");

    logger.flush().await;
    assert_eq!(sink.count(AccessDecision::Admitted), 4);
    assert_eq!(sink.count(AccessDecision::Rejected), 1);

    let rejected = sink
        .entries()
        .into_iter()
        .find(|e| e.decision == AccessDecision::Rejected)
        .unwrap();
    assert_eq!(rejected.status_code, 429);
    assert_eq!(rejected.client_key, "10.0.0.1");
    assert_eq!(rejected.path, "/users");
    assert_eq!(rejected.method, "GET");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_burst_admits_exactly_limit() {
    let (logger, sink, _shutdown) = memory_logger(LogFormat::Structured);
    let admission = Admission::new(FixedWindowLimiter::new(quota(10, 60)), logger.clone());
    let app = app(admission);

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move {
                app.oneshot(request_from("/users", PEER_A))
                    .await
                    .unwrap()
                    .status()
            })
        })
        .collect();

    let mut ok = 0;
    let mut limited = 0;
    for task in tasks {
        match task.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::TOO_MANY_REQUESTS => limited += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(ok, 10);
    assert_eq!(limited, 40);

    logger.flush().await;
    assert_eq!(sink.len(), 50);
    assert_eq!(sink.count(AccessDecision::Admitted), 10);
    assert_eq!(sink.count(AccessDecision::Rejected), 40);

    let ids: HashSet<_> = sink.entries().into_iter().map(|e| e.correlation_id).collect();
    assert_eq!(ids.len(), 50, "every request gets its own correlation id");
}

#[tokio::test]
async fn test_keys_are_independent() {
    let (logger, _sink, _shutdown) = memory_logger(LogFormat::Structured);
    let admission = Admission::new(FixedWindowLimiter::new(quota(1, 60)), logger);
    let app = app(admission);

    let first = app.clone().oneshot(request_from("/users", PEER_A)).await.unwrap();
    let second = app.clone().oneshot(request_from("/users", PEER_A)).await.unwrap();
    let other = app.clone().oneshot(request_from("/users", PEER_B)).await.unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_path_scoped_keys() {
    let (logger, sink, _shutdown) = memory_logger(LogFormat::Structured);
    let admission = Admission::new(FixedWindowLimiter::new(quota(1, 60)), logger.clone())
        .with_key_extractor(ClientIpAndPathKey);
    let app = app(admission);

    let users = app.clone().oneshot(request_from("/users", PEER_A)).await.unwrap();
    let context = app.clone().oneshot(request_from("/context", PEER_A)).await.unwrap();
    assert_eq!(users.status(), StatusCode::OK);
    assert_eq!(context.status(), StatusCode::OK);

    logger.flush().await;
    let keys: Vec<_> = sink.entries().into_iter().map(|e| e.client_key).collect();
    assert_eq!(keys, vec!["10.0.0.1:/users", "10.0.0.1:/context"]);
}

#[tokio::test]
async fn test_handler_error_status_is_logged() {
    let (logger, sink, _shutdown) = memory_logger(LogFormat::Structured);
    let admission = Admission::new(FixedWindowLimiter::new(quota(10, 60)), logger.clone());
    let app = app(admission);

    let response = app.oneshot(request_from("/orders", PEER_A)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key(X_REQUEST_ID));

    logger.flush().await;
    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].decision, AccessDecision::Admitted);
    assert_eq!(entries[0].status_code, 503);
}

#[tokio::test]
async fn test_handler_panic_becomes_generic_500() {
    let (logger, sink, _shutdown) = memory_logger(LogFormat::Structured);
    let admission = Admission::new(FixedWindowLimiter::new(quota(10, 60)), logger.clone());
    let app = app(admission);

    let response = app.clone().oneshot(request_from("/panic", PEER_A)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().contains_key(X_REQUEST_ID));
    let body = body_json(response).await;
    assert_eq!(body["error"], "Internal server error");
    assert!(!body.to_string().contains("exploded"), "panic details must not leak");

    // The pipeline keeps serving after a panic.
    let response = app.oneshot(request_from("/users", PEER_A)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    logger.flush().await;
    let statuses: Vec<_> = sink.entries().into_iter().map(|e| e.status_code).collect();
    assert_eq!(statuses, vec![500, 200]);
    assert_eq!(sink.count(AccessDecision::Admitted), 2);
}

#[tokio::test]
async fn test_handler_sees_request_context() {
    let (logger, sink, _shutdown) = memory_logger(LogFormat::Structured);
    let admission = Admission::new(FixedWindowLimiter::new(quota(10, 60)), logger.clone());
    let app = app(admission);

    let response = app.oneshot(request_from("/context", PEER_B)).await.unwrap();
    let header_id = response.headers()[X_REQUEST_ID].to_str().unwrap().to_owned();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(body, format!("{} 10.0.0.2", header_id));

    logger.flush().await;
    assert_eq!(sink.entries()[0].correlation_id, header_id);
}

#[tokio::test]
async fn test_incoming_request_id_is_replaced() {
    let (logger, _sink, _shutdown) = memory_logger(LogFormat::Structured);
    let admission = Admission::unlimited(logger);
    let app = app(admission);

    let mut req = request_from("/users", PEER_A);
    req.headers_mut()
        .insert(X_REQUEST_ID, "client-chosen".parse().unwrap());
    let response = app.oneshot(req).await.unwrap();
    assert_ne!(response.headers()[X_REQUEST_ID], "client-chosen");
}

#[tokio::test]
async fn test_exempt_paths_skip_limiter_but_are_logged() {
    let (logger, sink, _shutdown) = memory_logger(LogFormat::Structured);
    let admission = Admission::new(FixedWindowLimiter::new(quota(1, 60)), logger.clone())
        .with_exempt_paths(["/health"]);
    let app = app(admission);

    for _ in 0..3 {
        let response = app.clone().oneshot(request_from("/health", PEER_A)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(X_RATELIMIT_LIMIT));
    }

    let first = app.clone().oneshot(request_from("/users", PEER_A)).await.unwrap();
    let second = app.clone().oneshot(request_from("/users", PEER_A)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    logger.flush().await;
    assert_eq!(sink.count(AccessDecision::Admitted), 4);
    assert_eq!(sink.count(AccessDecision::Rejected), 1);
}

#[tokio::test]
async fn test_unlimited_admits_everything() {
    let (logger, sink, _shutdown) = memory_logger(LogFormat::Structured);
    let app = app(Admission::unlimited(logger.clone()));

    for _ in 0..20 {
        let response = app.clone().oneshot(request_from("/users", PEER_A)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    logger.flush().await;
    assert_eq!(sink.count(AccessDecision::Admitted), 20);
}

#[tokio::test]
async fn test_cancelled_request_is_logged_once() {
    let (logger, sink, _shutdown) = memory_logger(LogFormat::Structured);
    let admission = Admission::new(FixedWindowLimiter::new(quota(1, 60)), logger.clone());
    let app = app(admission);

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        app.clone().oneshot(request_from("/slow", PEER_A)),
    )
    .await;
    assert!(outcome.is_err(), "slow handler should still be running");

    // The cancelled request consumed the only slot in the window.
    let response = app.oneshot(request_from("/users", PEER_A)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    logger.flush().await;
    let entries = sink.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].decision, AccessDecision::Cancelled);
    assert_eq!(entries[0].status_code, 499);
    assert_eq!(entries[0].path, "/slow");
    assert_eq!(entries[1].decision, AccessDecision::Rejected);
}

#[tokio::test]
async fn test_future_dropped_before_poll_consumes_nothing() {
    let (logger, sink, _shutdown) = memory_logger(LogFormat::Structured);
    let admission = Admission::new(FixedWindowLimiter::new(quota(1, 60)), logger.clone());
    let mut app = app(admission);

    let future = ServiceExt::<Request<Body>>::ready(&mut app)
        .await
        .unwrap()
        .call(request_from("/users", PEER_A));
    drop(future);

    let response = app.oneshot(request_from("/users", PEER_A)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    logger.flush().await;
    assert_eq!(sink.len(), 1);
    assert_eq!(sink.count(AccessDecision::Admitted), 1);
}

#[tokio::test]
async fn test_text_format_lines() {
    let (logger, sink, _shutdown) = memory_logger(LogFormat::Text);
    let admission = Admission::new(FixedWindowLimiter::new(quota(1, 60)), logger.clone());
    let app = app(admission);

    app.clone().oneshot(request_from("/users", PEER_A)).await.unwrap();
    app.oneshot(request_from("/users", PEER_A)).await.unwrap();

    logger.flush().await;
    let lines = sink.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("admitted GET /users | Status: 200"));
    assert!(lines[1].contains("rejected GET /users | Status: 429"));
    assert!(lines[1].contains("client=10.0.0.1"));
}

#[tokio::test]
#[allow(deprecated)]
async fn test_timed_out_delegate_is_logged_as_408() {
    let (logger, sink, _shutdown) = memory_logger(LogFormat::Structured);
    let admission = Admission::new(FixedWindowLimiter::new(quota(10, 60)), logger.clone());
    // Same layering as the server: timeout inside, admission outermost.
    let app = routes()
        .layer(TimeoutLayer::new(Duration::from_millis(100)))
        .layer(middleware::from_fn_with_state(
            Arc::new(admission),
            admission_middleware,
        ));

    let response = app.oneshot(request_from("/slow", PEER_A)).await.unwrap();
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(response.headers().contains_key(X_REQUEST_ID));

    logger.flush().await;
    let entries = sink.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].decision, AccessDecision::Admitted);
    assert_eq!(entries[0].status_code, 408);
}

#[tokio::test]
async fn test_slow_log_sink_does_not_delay_requests() {
    struct SlowSink;

    impl LogSink for SlowSink {
        fn write(&mut self, _: &AccessLogEntry, _: &str) -> std::io::Result<()> {
            std::thread::sleep(Duration::from_millis(800));
            Ok(())
        }
    }

    let shutdown = Shutdown::new();
    let (logger, _drain) =
        AccessLogger::spawn(&LoggingConfig::default(), Box::new(SlowSink), shutdown.subscribe());
    let app = app(Admission::new(FixedWindowLimiter::new(quota(10, 60)), logger));

    let mut slowest = Duration::ZERO;
    for _ in 0..3 {
        let started = Instant::now();
        let response = app.clone().oneshot(request_from("/users", PEER_A)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        slowest = slowest.max(started.elapsed());
        tokio::task::yield_now().await;
    }
    assert!(slowest < Duration::from_millis(400), "request took {slowest:?}");
}

#[tokio::test]
async fn test_from_config_uses_configured_key() {
    let (logger, sink, _shutdown) = memory_logger(LogFormat::Structured);
    let config = RateLimitConfig {
        quota: quota(1, 60),
        key: KeyStrategy::Header("x-api-key".to_string()),
        exempt_paths: vec!["/health".to_string()],
        ..RateLimitConfig::default()
    };
    let app = app(Admission::from_config(&config, logger.clone()));

    let keyed = |key: &str| {
        let mut req = request_from("/users", PEER_A);
        req.headers_mut().insert("x-api-key", key.parse().unwrap());
        req
    };

    let first = app.clone().oneshot(keyed("alpha")).await.unwrap();
    let second = app.clone().oneshot(keyed("alpha")).await.unwrap();
    let other = app.clone().oneshot(keyed("beta")).await.unwrap();
    let health = app.clone().oneshot(request_from("/health", PEER_A)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(other.status(), StatusCode::OK);
    assert_eq!(health.status(), StatusCode::OK);

    logger.flush().await;
    let keys: Vec<_> = sink.entries().into_iter().map(|e| e.client_key).collect();
    assert_eq!(keys[..3], ["x-api-key=alpha", "x-api-key=alpha", "x-api-key=beta"]);
}

//! Responses produced by the gate itself.
//!
//! # Responsibilities
//! - Build the 429 rejection with a `Retry-After` hint
//! - Build the generic 500 returned when a delegate fails
//! - Stamp correlation and quota headers onto any response
//!
//! # Design Decisions
//! - Bodies are JSON so clients can parse rejections the same way as
//!   application errors
//! - `Retry-After` is rounded up to whole seconds and never zero

use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::http::request::{CorrelationId, X_REQUEST_ID};

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Status logged for requests abandoned by the client.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Whole seconds a rejected client should wait, at least one.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

/// The limiter refused the request.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
    pub limit: u64,
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let secs = retry_after_secs(self.retry_after);
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Rate limit exceeded",
                "message": "Too many requests. Please try again later.",
                "retry_after_secs": secs,
            })),
        )
            .into_response();

        let headers = response.headers_mut();
        headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        headers.insert(HeaderName::from_static(X_RATELIMIT_LIMIT), HeaderValue::from(self.limit));
        headers.insert(HeaderName::from_static(X_RATELIMIT_REMAINING), HeaderValue::from(0u64));
        response
    }
}

/// The delegate failed; the client gets a generic error.
#[derive(Debug, Clone, Copy)]
pub struct HandlerFailure;

impl IntoResponse for HandlerFailure {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Internal server error",
                "message": "An unexpected error occurred. Please try again later.",
            })),
        )
            .into_response()
    }
}

/// Attach `X-Request-ID`.
pub fn stamp_correlation_id(response: &mut Response, id: &CorrelationId) {
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(X_REQUEST_ID), value);
    }
}

/// Attach the quota headers for an admitted request.
pub fn stamp_quota(response: &mut Response, limit: u64, remaining: u64) {
    let headers = response.headers_mut();
    headers.insert(HeaderName::from_static(X_RATELIMIT_LIMIT), HeaderValue::from(limit));
    headers.insert(HeaderName::from_static(X_RATELIMIT_REMAINING), HeaderValue::from(remaining));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_secs(57)), 57);
        assert_eq!(retry_after_secs(Duration::from_millis(56_001)), 57);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[test]
    fn rejection_carries_hint_headers() {
        let response = RateLimitExceeded {
            retry_after: Duration::from_millis(1500),
            limit: 3,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
        assert_eq!(response.headers()[X_RATELIMIT_LIMIT], "3");
        assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "0");
    }

    #[test]
    fn correlation_header_is_stamped() {
        let id = CorrelationId::new();
        let mut response = HandlerFailure.into_response();
        stamp_correlation_id(&mut response, &id);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[X_REQUEST_ID], id.as_str());
    }
}

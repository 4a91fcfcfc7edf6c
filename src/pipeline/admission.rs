//! Admission stages and the per-request in-flight record.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};

use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitConfig;
use crate::http::request::{CorrelationId, RequestContext};
use crate::http::response::{
    retry_after_secs, stamp_correlation_id, stamp_quota, HandlerFailure, RateLimitExceeded,
    CLIENT_CLOSED_REQUEST,
};
use crate::observability::access_log::{AccessDecision, AccessLogEntry, AccessLogger};
use crate::observability::metrics;
use crate::security::key::{KeyExtractor, SharedKeyExtractor};
use crate::security::rate_limit::{Decision, FixedWindowLimiter};

/// Shared state of the admission pipeline: limiter, logger, key extractor
/// and clock. One instance serves every request.
#[derive(Debug)]
pub struct Admission {
    limiter: Option<FixedWindowLimiter>,
    logger: AccessLogger,
    keys: SharedKeyExtractor,
    clock: Arc<dyn Clock>,
    exempt_paths: HashSet<String>,
}

impl Admission {
    /// Gate requests through `limiter`, keyed by client address.
    pub fn new(limiter: FixedWindowLimiter, logger: AccessLogger) -> Self {
        Self {
            limiter: Some(limiter),
            logger,
            keys: SharedKeyExtractor::default(),
            clock: Arc::new(SystemClock::new()),
            exempt_paths: HashSet::new(),
        }
    }

    /// Log every request but admit all of them.
    pub fn unlimited(logger: AccessLogger) -> Self {
        Self {
            limiter: None,
            logger,
            keys: SharedKeyExtractor::default(),
            clock: Arc::new(SystemClock::new()),
            exempt_paths: HashSet::new(),
        }
    }

    /// Build from the `[rate_limit]` section.
    pub fn from_config(config: &RateLimitConfig, logger: AccessLogger) -> Self {
        let mut admission = if config.enabled {
            Self::new(
                FixedWindowLimiter::with_retention(config.quota, config.retention_multiple),
                logger,
            )
        } else {
            Self::unlimited(logger)
        };

        admission.keys = SharedKeyExtractor::from_strategy(&config.key);
        admission.with_exempt_paths(config.exempt_paths.iter().cloned())
    }

    pub fn with_key_extractor(mut self, extractor: impl KeyExtractor + 'static) -> Self {
        self.keys = SharedKeyExtractor::new(extractor);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Paths that skip the limiter. They are still logged as admitted.
    pub fn with_exempt_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.exempt_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn limiter(&self) -> Option<&FixedWindowLimiter> {
        self.limiter.as_ref()
    }

    pub fn logger(&self) -> &AccessLogger {
        &self.logger
    }

    /// Drop idle limiter windows; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.limiter
            .as_ref()
            .map_or(0, |limiter| limiter.purge_expired(self.clock.now()))
    }

    /// Arrival, correlation id and key derivation.
    ///
    /// From here on the returned record emits exactly one log entry, even
    /// if it is dropped without being finished.
    pub(crate) fn begin(&self, request: &mut Request<Body>) -> InFlight {
        let started = self.clock.now();
        let arrived_at = Utc::now();

        let correlation_id = CorrelationId::new();
        let client_key = self.keys.extract(request);
        let context = RequestContext {
            correlation_id: correlation_id.clone(),
            method: request.method().as_str().to_owned(),
            path: request.uri().path().to_owned(),
            client_key,
        };

        tracing::debug!(
            correlation_id = %context.correlation_id,
            method = %context.method,
            path = %context.path,
            client = %context.client_key,
            "Incoming request"
        );

        request.extensions_mut().insert(correlation_id);
        request.extensions_mut().insert(context.clone());

        InFlight {
            context,
            logger: self.logger.clone(),
            clock: Arc::clone(&self.clock),
            started,
            arrived_at,
            finished: false,
        }
    }

    /// Rate check against the request's key.
    pub(crate) fn admit(&self, in_flight: &InFlight) -> Verdict {
        let Some(limiter) = self.limiter.as_ref() else {
            return Verdict::Bypass;
        };
        if self.exempt_paths.contains(&in_flight.context.path) {
            return Verdict::Bypass;
        }

        let limit = limiter.quota().limit();
        match limiter.check(&in_flight.context.client_key, self.clock.now()) {
            Decision::Admitted { remaining } => Verdict::Admitted { limit, remaining },
            Decision::Rejected { retry_after } => Verdict::Rejected { limit, retry_after },
        }
    }
}

/// Limiter outcome as seen by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Limiting disabled or the path is exempt.
    Bypass,
    Admitted { limit: u64, remaining: u64 },
    Rejected { limit: u64, retry_after: Duration },
}

impl Verdict {
    /// Quota headers for an admitted response.
    pub(crate) fn quota(&self) -> Option<(u64, u64)> {
        match *self {
            Verdict::Admitted { limit, remaining } => Some((limit, remaining)),
            _ => None,
        }
    }
}

/// A request between arrival and its single log entry.
pub(crate) struct InFlight {
    context: RequestContext,
    logger: AccessLogger,
    clock: Arc<dyn Clock>,
    started: Instant,
    arrived_at: DateTime<Utc>,
    finished: bool,
}

impl InFlight {
    pub(crate) fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Terminal state for a rejected request.
    pub(crate) fn reject(self, limit: u64, retry_after: Duration) -> Response {
        tracing::warn!(
            correlation_id = %self.context.correlation_id,
            client = %self.context.client_key,
            path = %self.context.path,
            retry_after_secs = retry_after_secs(retry_after),
            "Rate limit exceeded"
        );
        metrics::record_rate_limited();

        let mut response = RateLimitExceeded { retry_after, limit }.into_response();
        stamp_correlation_id(&mut response, &self.context.correlation_id);
        self.finish(AccessDecision::Rejected, StatusCode::TOO_MANY_REQUESTS.as_u16());
        response
    }

    /// Terminal state for an admitted request. `outcome` is the delegate's
    /// response, or its panic message; a panic becomes a generic 500.
    pub(crate) fn complete(
        self,
        outcome: Result<Response, String>,
        quota: Option<(u64, u64)>,
    ) -> Response {
        let mut response = match outcome {
            Ok(response) => response,
            Err(panic) => {
                tracing::error!(
                    correlation_id = %self.context.correlation_id,
                    method = %self.context.method,
                    path = %self.context.path,
                    panic = %panic,
                    "Delegate handler panicked"
                );
                HandlerFailure.into_response()
            }
        };

        stamp_correlation_id(&mut response, &self.context.correlation_id);
        if let Some((limit, remaining)) = quota {
            stamp_quota(&mut response, limit, remaining);
        }
        self.finish(AccessDecision::Admitted, response.status().as_u16());
        response
    }

    fn finish(mut self, decision: AccessDecision, status: u16) {
        self.finished = true;
        self.emit(decision, status);
    }

    fn emit(&self, decision: AccessDecision, status: u16) {
        let latency = self.clock.now().saturating_duration_since(self.started);
        metrics::record_request(decision.as_str(), status, latency);

        self.logger.emit(AccessLogEntry {
            correlation_id: self.context.correlation_id.to_string(),
            method: self.context.method.clone(),
            path: self.context.path.clone(),
            client_key: self.context.client_key.clone(),
            decision,
            status_code: status,
            latency_ms: latency.as_secs_f64() * 1000.0,
            timestamp: self.arrived_at,
        });
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!(
                correlation_id = %self.context.correlation_id,
                path = %self.context.path,
                "Request cancelled before completion"
            );
            self.emit(AccessDecision::Cancelled, CLIENT_CLOSED_REQUEST);
        }
    }
}

//! Axum middleware running every request through the admission stages.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use futures_util::FutureExt;
use tracing::Instrument;

use crate::pipeline::admission::{Admission, Verdict};

/// Admission middleware, installed with
/// `axum::middleware::from_fn_with_state(admission, admission_middleware)`.
///
/// Stages 1 to 4 (arrival, correlation id, key, rate check) run without an
/// await point between them, so once the limiter has counted the request
/// the in-flight record already exists and will log it.
pub async fn admission_middleware(
    State(admission): State<Arc<Admission>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let in_flight = admission.begin(&mut request);

    let verdict = admission.admit(&in_flight);
    if let Verdict::Rejected { limit, retry_after } = verdict {
        return in_flight.reject(limit, retry_after);
    }

    let span = tracing::info_span!(
        "request",
        correlation_id = %in_flight.context().correlation_id,
        method = %in_flight.context().method,
        path = %in_flight.context().path,
    );

    let outcome = AssertUnwindSafe(next.run(request))
        .catch_unwind()
        .instrument(span)
        .await
        .map_err(|panic| panic_message(&*panic));

    in_flight.complete(outcome, verdict.quota())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

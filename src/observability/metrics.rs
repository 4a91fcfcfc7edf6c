//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): requests by decision and status
//! - `gate_request_duration_seconds` (histogram): pipeline latency
//! - `gate_rate_limited_total` (counter): rejected requests
//! - `gate_access_log_dropped_total` (counter): entries lost to a full queue
//! - `gate_access_log_sink_errors_total` (counter): failed sink writes
//! - `gate_rate_limit_keys` (gauge): keys tracked by the limiter
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op
//! - Labels kept low-cardinality: no client keys or paths

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(decision: &'static str, status: u16, latency: Duration) {
    metrics::counter!(
        "gate_requests_total",
        "decision" => decision,
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gate_request_duration_seconds", "decision" => decision)
        .record(latency.as_secs_f64());
}

pub fn record_rate_limited() {
    metrics::counter!("gate_rate_limited_total").increment(1);
}

pub fn record_log_dropped() {
    metrics::counter!("gate_access_log_dropped_total").increment(1);
}

pub fn record_sink_error() {
    metrics::counter!("gate_access_log_sink_errors_total").increment(1);
}

pub fn record_tracked_keys(count: usize) {
    metrics::gauge!("gate_rate_limit_keys").set(count as f64);
}

//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, upstream attempts, connections)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, rule
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_upstream_attempts_total` (counter): upstream attempts by result
//! - `gateway_active_connections` (gauge): current inbound connection count
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, which is what tests rely on

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one finished exchange.
pub fn record_request(method: &str, status: u16, rule: &str, started: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "rule" => rule.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "rule" => rule.to_string())
        .record(started.elapsed().as_secs_f64());
}

/// Record one upstream attempt; `result` is `success` or `failure`.
pub fn record_upstream_attempt(result: &'static str) {
    metrics::counter!("gateway_upstream_attempts_total", "result" => result).increment(1);
}

pub fn connection_opened() {
    metrics::gauge!("gateway_active_connections").increment(1.0);
}

pub fn connection_closed() {
    metrics::gauge!("gateway_active_connections").decrement(1.0);
}

//! Metrics collection and exposition.
//!
//! # Metrics
//! - `httpserve_requests_total` (counter): requests by method, status
//! - `httpserve_request_duration_seconds` (histogram): handler latency
//! - `httpserve_websocket_connections` (gauge): open websocket connections
//! - `httpserve_websocket_messages_total` (counter): frames by direction, kind
//! - `httpserve_sessions_active` (gauge): sessions held by the store
//! - `httpserve_soap_faults_total` (counter): fault envelopes by fault code
//!
//! Recording is a no-op until an exporter is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed HTTP request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "httpserve_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("httpserve_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// A websocket connection was opened.
pub fn websocket_opened() {
    gauge!("httpserve_websocket_connections").increment(1.0);
}

/// A websocket connection was closed.
pub fn websocket_closed() {
    gauge!("httpserve_websocket_connections").decrement(1.0);
}

/// Record a websocket frame. `direction` is `in` or `out`.
pub fn record_websocket_message(direction: &'static str, kind: &'static str) {
    counter!(
        "httpserve_websocket_messages_total",
        "direction" => direction,
        "kind" => kind
    )
    .increment(1);
}

/// Current number of sessions held by the store.
pub fn record_sessions(count: usize) {
    gauge!("httpserve_sessions_active").set(count as f64);
}

/// A SOAP fault envelope was produced.
pub fn record_soap_fault(code: &'static str) {
    counter!("httpserve_soap_faults_total", "code" => code).increment(1);
}

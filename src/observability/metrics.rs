//! Metrics collection and exposition.
//!
//! # Metrics
//! - `exchange_requests_total` (counter): HTTP requests by route, status
//! - `exchange_request_duration_seconds` (histogram): latency by route
//! - `exchange_operations_total` (counter): register/claim outcomes
//! - `exchange_rate_limited_total` (counter): rejected by the rate governor
//! - `exchange_tracked_identities` (gauge): identities holding a rate window
//! - `exchange_expired_entries_total` (counter): unclaimed entries dropped by the sweeper
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with its own scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(route: &'static str, status: u16, start: Instant) {
    counter!("exchange_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    histogram!("exchange_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_outcome(operation: &'static str, outcome: &'static str) {
    counter!("exchange_operations_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}

pub fn record_rate_limited() {
    counter!("exchange_rate_limited_total").increment(1);
}

pub fn record_tracked_identities(count: usize) {
    gauge!("exchange_tracked_identities").set(count as f64);
}

pub fn record_expired_entries(count: usize) {
    counter!("exchange_expired_entries_total").increment(count as u64);
}

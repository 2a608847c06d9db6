//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_master_subscription_requests_total` (counter): `/sub` requests by status
//! - `proxy_master_addition_fetches_total` (counter): addition fetches by outcome
//! - `proxy_master_dependency_cache_total` (counter): dependency cache hits/misses
//! - `proxy_master_port_rotations_total` (counter): rotation cycles by outcome
//! - `proxy_master_active_ports` (gauge): resident decoy ports
//! - `proxy_master_process_starts_total` (counter): supervised process launches
//! - `proxy_master_process_exits_total` (counter): supervised exits by outcome
//! - `proxy_master_syncs_total` (counter): client sync cycles by outcome

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_subscription_request(status: u16) {
    metrics::counter!(
        "proxy_master_subscription_requests_total",
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_addition_fetch(outcome: &'static str) {
    metrics::counter!("proxy_master_addition_fetches_total", "outcome" => outcome).increment(1);
}

pub fn record_dependency_cache(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("proxy_master_dependency_cache_total", "result" => result).increment(1);
}

pub fn record_port_rotation(outcome: &'static str) {
    metrics::counter!("proxy_master_port_rotations_total", "outcome" => outcome).increment(1);
}

pub fn record_active_ports(count: usize) {
    metrics::gauge!("proxy_master_active_ports").set(count as f64);
}

pub fn record_process_start() {
    metrics::counter!("proxy_master_process_starts_total").increment(1);
}

pub fn record_process_exit(outcome: &'static str) {
    metrics::counter!("proxy_master_process_exits_total", "outcome" => outcome).increment(1);
}

pub fn record_sync(outcome: &'static str) {
    metrics::counter!("proxy_master_syncs_total", "outcome" => outcome).increment(1);
}

//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gatewire_config_tests_total` (counter): nginx config tests by result
//! - `gatewire_quarantined_files_total` (counter): files renamed to `.err`
//! - `gatewire_proxy_reloads_total` (counter): nginx reloads by result
//! - `gatewire_mesh_syncs_total` (counter): WireGuard config applies by mode
//! - `gatewire_expired_services_total` (counter): services disabled by TTL
//! - `gatewire_node_reachable` (gauge): 1=answered ping, 0=silent

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_config_test(passed: bool) {
    let result = if passed { "passed" } else { "failed" };
    metrics::counter!("gatewire_config_tests_total", "result" => result).increment(1);
}

pub fn record_quarantine() {
    metrics::counter!("gatewire_quarantined_files_total").increment(1);
}

pub fn record_reload(ok: bool) {
    let result = if ok { "ok" } else { "error" };
    metrics::counter!("gatewire_proxy_reloads_total", "result" => result).increment(1);
}

/// `mode` is `sync` for live syncconf or `up` for interface bring-up.
pub fn record_mesh_sync(mode: &'static str) {
    metrics::counter!("gatewire_mesh_syncs_total", "mode" => mode).increment(1);
}

pub fn record_expired(kind: &'static str) {
    metrics::counter!("gatewire_expired_services_total", "kind" => kind).increment(1);
}

pub fn record_node_reachable(address: &str, reachable: bool) {
    metrics::gauge!("gatewire_node_reachable", "address" => address.to_string())
        .set(if reachable { 1.0 } else { 0.0 });
}

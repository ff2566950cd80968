//! Metrics collection and exposition.
//!
//! # Metrics
//! - `monitor_rpc_calls_total` (counter): node calls by method and result
//! - `monitor_rpc_latency_seconds` (histogram): node call latency by method
//! - `monitor_rpc_cache_total` (counter): height cache hits and misses
//! - `monitor_rpc_rate_limited_total` (counter): budget refusals by window
//! - `monitor_rpc_healthy` (gauge): 1=healthy, 0=unhealthy
//! - `monitor_blocks_processed_total` (counter), `monitor_last_block` (gauge)
//! - `monitor_candidates_total` (counter): candidates by symbol and reason
//! - `monitor_decode_failures_total` (counter)
//! - `monitor_confirmations_total` (counter): terminal outcomes by status
//! - `monitor_pending_transactions` (gauge)
//! - `monitor_watch_updates_total` (counter): feed updates by result
//! - `monitor_notify_failures_total` (counter)
//!
//! All functions are no-ops until a recorder is installed.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_rpc_call(method: &'static str, success: bool, latency: Duration) {
    let result = if success { "ok" } else { "error" };
    counter!("monitor_rpc_calls_total", "method" => method, "result" => result).increment(1);
    histogram!("monitor_rpc_latency_seconds", "method" => method).record(latency.as_secs_f64());
}

pub fn record_rpc_cache(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("monitor_rpc_cache_total", "result" => result).increment(1);
}

pub fn record_rate_limited(window: &'static str) {
    counter!("monitor_rpc_rate_limited_total", "window" => window).increment(1);
}

pub fn record_rpc_health(healthy: bool) {
    gauge!("monitor_rpc_healthy").set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_block_processed(number: u64) {
    counter!("monitor_blocks_processed_total").increment(1);
    gauge!("monitor_last_block").set(number as f64);
}

pub fn record_candidate(symbol: &str, reason: &'static str) {
    counter!("monitor_candidates_total", "symbol" => symbol.to_string(), "reason" => reason).increment(1);
}

pub fn record_decode_failure() {
    counter!("monitor_decode_failures_total").increment(1);
}

pub fn record_confirmation(status: &'static str) {
    counter!("monitor_confirmations_total", "status" => status).increment(1);
}

pub fn record_pending(count: usize) {
    gauge!("monitor_pending_transactions").set(count as f64);
}

pub fn record_watch_update(result: &'static str) {
    counter!("monitor_watch_updates_total", "result" => result).increment(1);
}

pub fn record_notify_failure() {
    counter!("monitor_notify_failures_total").increment(1);
}

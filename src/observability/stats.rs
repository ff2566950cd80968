//! In-process performance counters.
//!
//! Components update these through narrow `record_*` calls; each call is
//! mirrored to the Prometheus recorder. Counters accumulate until `reset`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;

use crate::monitor::types::{ConfirmationStatus, MatchReason};
use crate::observability::metrics;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Shared counters for the whole monitor.
#[derive(Debug)]
pub struct PerformanceMetrics {
    since: Mutex<Instant>,
    rpc_calls: AtomicU64,
    rpc_calls_by_method: DashMap<&'static str, u64>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    blocks_processed: AtomicU64,
    candidates_found: AtomicU64,
    candidates_by_symbol: DashMap<String, u64>,
    token_transfers_decoded: AtomicU64,
    decode_failures: AtomicU64,
    self_transfers_skipped: AtomicU64,
    confirmations_completed: AtomicU64,
    timeouts: AtomicU64,
    reorgs: AtomicU64,
    watch_updates_applied: AtomicU64,
    watch_updates_rejected: AtomicU64,
    notify_failures: AtomicU64,
}

/// Point-in-time copy of the counters plus derived rates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub rpc_calls: u64,
    pub rpc_calls_by_method: Vec<(String, u64)>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Percentage of height lookups answered from cache.
    pub cache_hit_rate: f64,
    pub avg_rpc_per_second: f64,
    pub estimated_daily_calls: u64,
    pub blocks_processed: u64,
    pub candidates_found: u64,
    pub candidates_by_symbol: Vec<(String, u64)>,
    pub token_transfers_decoded: u64,
    pub decode_failures: u64,
    pub self_transfers_skipped: u64,
    pub confirmations_completed: u64,
    pub timeouts: u64,
    pub reorgs: u64,
    pub watch_updates_applied: u64,
    pub watch_updates_rejected: u64,
    pub notify_failures: u64,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            since: Mutex::new(Instant::now()),
            rpc_calls: AtomicU64::new(0),
            rpc_calls_by_method: DashMap::new(),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            blocks_processed: AtomicU64::new(0),
            candidates_found: AtomicU64::new(0),
            candidates_by_symbol: DashMap::new(),
            token_transfers_decoded: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            self_transfers_skipped: AtomicU64::new(0),
            confirmations_completed: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            reorgs: AtomicU64::new(0),
            watch_updates_applied: AtomicU64::new(0),
            watch_updates_rejected: AtomicU64::new(0),
            notify_failures: AtomicU64::new(0),
        }
    }

    pub fn record_rpc_call(&self, method: &'static str) {
        self.rpc_calls.fetch_add(1, Ordering::Relaxed);
        *self.rpc_calls_by_method.entry(method).or_insert(0) += 1;
    }

    pub fn record_cache(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_rpc_cache(hit);
    }

    pub fn record_block_processed(&self, number: u64) {
        self.blocks_processed.fetch_add(1, Ordering::Relaxed);
        metrics::record_block_processed(number);
    }

    pub fn record_candidate(&self, symbol: &str, reason: MatchReason) {
        self.candidates_found.fetch_add(1, Ordering::Relaxed);
        *self.candidates_by_symbol.entry(symbol.to_string()).or_insert(0) += 1;
        metrics::record_candidate(symbol, reason.as_str());
    }

    pub fn record_token_transfer(&self) {
        self.token_transfers_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
        metrics::record_decode_failure();
    }

    pub fn record_self_transfer(&self) {
        self.self_transfers_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_terminal(&self, status: ConfirmationStatus) {
        let counter = match status {
            ConfirmationStatus::Confirmed => &self.confirmations_completed,
            ConfirmationStatus::TimedOut => &self.timeouts,
            ConfirmationStatus::Reorged => &self.reorgs,
            ConfirmationStatus::Pending => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::record_confirmation(status.as_str());
    }

    pub fn record_watch_update(&self, applied: bool, result: &'static str) {
        if applied {
            self.watch_updates_applied.fetch_add(1, Ordering::Relaxed);
        } else {
            self.watch_updates_rejected.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_watch_update(result);
    }

    pub fn record_notify_failure(&self) {
        self.notify_failures.fetch_add(1, Ordering::Relaxed);
        metrics::record_notify_failure();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.since.lock().expect("stats mutex poisoned").elapsed();
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        let rpc_calls = load(&self.rpc_calls);
        let cache_hits = load(&self.cache_hits);
        let cache_misses = load(&self.cache_misses);
        let lookups = cache_hits + cache_misses;
        let secs = elapsed.as_secs_f64();
        let avg_rpc_per_second = if secs > 0.0 { rpc_calls as f64 / secs } else { 0.0 };

        let mut by_method: Vec<_> = self
            .rpc_calls_by_method
            .iter()
            .map(|e| (e.key().to_string(), *e.value()))
            .collect();
        by_method.sort();
        let mut by_symbol: Vec<_> = self
            .candidates_by_symbol
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        by_symbol.sort();

        StatsSnapshot {
            uptime_secs: elapsed.as_secs(),
            rpc_calls,
            rpc_calls_by_method: by_method,
            cache_hits,
            cache_misses,
            cache_hit_rate: if lookups > 0 { cache_hits as f64 * 100.0 / lookups as f64 } else { 0.0 },
            avg_rpc_per_second,
            estimated_daily_calls: (avg_rpc_per_second * SECONDS_PER_DAY) as u64,
            blocks_processed: load(&self.blocks_processed),
            candidates_found: load(&self.candidates_found),
            candidates_by_symbol: by_symbol,
            token_transfers_decoded: load(&self.token_transfers_decoded),
            decode_failures: load(&self.decode_failures),
            self_transfers_skipped: load(&self.self_transfers_skipped),
            confirmations_completed: load(&self.confirmations_completed),
            timeouts: load(&self.timeouts),
            reorgs: load(&self.reorgs),
            watch_updates_applied: load(&self.watch_updates_applied),
            watch_updates_rejected: load(&self.watch_updates_rejected),
            notify_failures: load(&self.notify_failures),
        }
    }

    /// Zero every counter and restart the rate window.
    pub fn reset(&self) {
        *self.since.lock().expect("stats mutex poisoned") = Instant::now();
        for counter in [
            &self.rpc_calls,
            &self.cache_hits,
            &self.cache_misses,
            &self.blocks_processed,
            &self.candidates_found,
            &self.token_transfers_decoded,
            &self.decode_failures,
            &self.self_transfers_skipped,
            &self.confirmations_completed,
            &self.timeouts,
            &self.reorgs,
            &self.watch_updates_applied,
            &self.watch_updates_rejected,
            &self.notify_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.rpc_calls_by_method.clear();
        self.candidates_by_symbol.clear();
    }

    /// Emit one summary line.
    pub fn log_summary(&self, chain: &str) {
        let s = self.snapshot();
        tracing::info!(
            chain,
            uptime_secs = s.uptime_secs,
            rpc_calls = s.rpc_calls,
            avg_rpc_per_second = format_args!("{:.2}", s.avg_rpc_per_second),
            estimated_daily_calls = s.estimated_daily_calls,
            cache_hit_rate = format_args!("{:.1}%", s.cache_hit_rate),
            blocks = s.blocks_processed,
            candidates = s.candidates_found,
            confirmed = s.confirmations_completed,
            timed_out = s.timeouts,
            reorged = s.reorgs,
            decode_failures = s.decode_failures,
            "Monitor statistics"
        );
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = PerformanceMetrics::new();
        stats.record_rpc_call("eth_blockNumber");
        stats.record_rpc_call("eth_blockNumber");
        stats.record_rpc_call("eth_getBlockByNumber");
        stats.record_cache(true);
        stats.record_cache(true);
        stats.record_cache(true);
        stats.record_cache(false);
        stats.record_candidate("USDT", MatchReason::AmountThreshold);
        stats.record_terminal(ConfirmationStatus::Confirmed);
        stats.record_terminal(ConfirmationStatus::Reorged);
        stats.record_terminal(ConfirmationStatus::Pending);

        let s = stats.snapshot();
        assert_eq!(s.rpc_calls, 3);
        assert_eq!(
            s.rpc_calls_by_method,
            vec![("eth_blockNumber".to_string(), 2), ("eth_getBlockByNumber".to_string(), 1)]
        );
        assert_eq!(s.cache_hit_rate, 75.0);
        assert_eq!(s.candidates_by_symbol, vec![("USDT".to_string(), 1)]);
        assert_eq!(s.confirmations_completed, 1);
        assert_eq!(s.reorgs, 1);
        assert_eq!(s.timeouts, 0);
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let stats = PerformanceMetrics::new();
        stats.record_rpc_call("eth_blockNumber");
        stats.record_block_processed(10);
        stats.record_watch_update(false, "invalid");
        stats.reset();

        let s = stats.snapshot();
        assert_eq!(s.rpc_calls, 0);
        assert!(s.rpc_calls_by_method.is_empty());
        assert_eq!(s.blocks_processed, 0);
        assert_eq!(s.watch_updates_rejected, 0);
    }
}

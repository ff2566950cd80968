//! The chain access layer: budgeted, cached, retried node access.
//!
//! # Responsibilities
//! - Serve the current block height from a short-lived cache
//! - Charge one budget unit per node call, waiting cooperatively when full
//! - Retry transport failures with backoff
//! - Track node health and call statistics

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::TxHash;
use serde::Serialize;
use tokio::time::Instant;

use crate::blockchain::budget::{BudgetUsage, CallBudget};
use crate::blockchain::source::ChainSource;
use crate::blockchain::types::{BlockData, ReceiptData, RpcError, RpcResult};
use crate::config::schema::MonitorConfig;
use crate::health::state::{HealthState, HealthTracker};
use crate::observability::metrics;
use crate::observability::stats::PerformanceMetrics;
use crate::resilience::retries::RetryPolicy;

/// Daily budget usage above which the layer reports itself unhealthy.
const BUDGET_HEALTH_PERCENT: f64 = 90.0;

/// Tuning for `RpcManager`.
#[derive(Debug, Clone)]
pub struct RpcSettings {
    pub cache_ttl: Duration,
    pub max_budget_wait: Duration,
    pub max_calls_per_second: u32,
    pub max_calls_per_day: u32,
    pub retry: RetryPolicy,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,
}

impl RpcSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            cache_ttl: Duration::from_millis(config.rpc.cache_ttl_ms),
            max_budget_wait: Duration::from_millis(config.rpc.max_budget_wait_ms),
            max_calls_per_second: config.rpc.max_calls_per_second,
            max_calls_per_day: config.rpc.max_calls_per_day,
            retry: RetryPolicy::from_config(&config.retries),
            unhealthy_threshold: config.health.unhealthy_threshold,
            healthy_threshold: config.health.healthy_threshold,
        }
    }
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

/// Read-only snapshot of the access layer.
#[derive(Debug, Clone, Serialize)]
pub struct RpcHealth {
    pub healthy: bool,
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub cache_hit_rate: f64,
    pub recent_latency_ms: Option<u64>,
    pub last_error: Option<String>,
    pub cached_height: Option<u64>,
    pub budget: BudgetUsage,
}

/// Result of `test_connection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub height: u64,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    height: u64,
    fetched_at: Instant,
}

/// Budgeted and cached access to one chain.
pub struct RpcManager {
    source: Arc<dyn ChainSource>,
    settings: RpcSettings,
    budget: CallBudget,
    cache: Mutex<Option<CacheEntry>>,
    health: HealthTracker,
    stats: Arc<PerformanceMetrics>,
    /// Latency of the most recent node call, `u64::MAX` before the first one.
    last_latency_ms: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl RpcManager {
    pub fn new(source: Arc<dyn ChainSource>, settings: RpcSettings, stats: Arc<PerformanceMetrics>) -> Self {
        Self {
            budget: CallBudget::new(settings.max_calls_per_second, settings.max_calls_per_day),
            health: HealthTracker::new("rpc", settings.unhealthy_threshold, settings.healthy_threshold),
            source,
            settings,
            cache: Mutex::new(None),
            stats,
            last_latency_ms: AtomicU64::new(u64::MAX),
            last_error: Mutex::new(None),
        }
    }

    /// Current block height, from cache while fresh.
    ///
    /// When the budget is exhausted a stale cached value is returned rather
    /// than waiting; `RateLimited` only surfaces when nothing is cached.
    pub async fn current_block_height(&self) -> RpcResult<u64> {
        let cached = *self.cache.lock().expect("height cache mutex poisoned");
        if let Some(entry) = cached {
            if entry.fetched_at.elapsed() < self.settings.cache_ttl {
                self.stats.record_cache(true);
                return Ok(entry.height);
            }
        }
        self.stats.record_cache(false);

        let max_wait = if cached.is_some() { Duration::ZERO } else { self.settings.max_budget_wait };
        match self.call("eth_blockNumber", max_wait, || self.source.block_number()).await {
            Ok(height) => {
                *self.cache.lock().expect("height cache mutex poisoned") = Some(CacheEntry {
                    height,
                    fetched_at: Instant::now(),
                });
                Ok(height)
            }
            Err(RpcError::RateLimited(reason)) => match cached {
                Some(entry) => {
                    tracing::debug!(height = entry.height, reason = %reason, "Budget exhausted, serving stale height");
                    Ok(entry.height)
                }
                None => Err(RpcError::RateLimited(reason)),
            },
            Err(e) => Err(e),
        }
    }

    /// Last cached height regardless of age.
    pub fn cached_height(&self) -> Option<u64> {
        self.cache
            .lock()
            .expect("height cache mutex poisoned")
            .map(|entry| entry.height)
    }

    /// Fetch a block. Missing blocks surface as `BlockNotFound`.
    pub async fn get_block(&self, number: u64, full_transactions: bool) -> RpcResult<BlockData> {
        self.call("eth_getBlockByNumber", self.settings.max_budget_wait, || {
            self.source.block(number, full_transactions)
        })
        .await?
        .ok_or(RpcError::BlockNotFound(number))
    }

    /// Fetch a receipt. `None` means the node does not know the transaction.
    pub async fn get_transaction_receipt(&self, hash: TxHash) -> RpcResult<Option<ReceiptData>> {
        self.call("eth_getTransactionReceipt", self.settings.max_budget_wait, || {
            self.source.transaction_receipt(hash)
        })
        .await
    }

    /// Fetch height and chain id in one go, for startup diagnostics.
    pub async fn test_connection(&self) -> RpcResult<ConnectionInfo> {
        let height = self.current_block_height().await?;
        let chain_id = self
            .call("eth_chainId", self.settings.max_budget_wait, || self.source.chain_id())
            .await?;
        Ok(ConnectionInfo { height, chain_id })
    }

    /// Compare the node's chain id with `expected`.
    pub async fn verify_chain_id(&self, expected: u64) -> RpcResult<()> {
        let actual = self
            .call("eth_chainId", self.settings.max_budget_wait, || self.source.chain_id())
            .await?;
        if actual != expected {
            return Err(RpcError::ChainMismatch { expected, actual });
        }
        Ok(())
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy() && self.budget.usage().day_usage_percent < BUDGET_HEALTH_PERCENT
    }

    pub fn health(&self) -> RpcHealth {
        let stats = self.stats.snapshot();
        let latency = self.last_latency_ms.load(Ordering::Relaxed);
        RpcHealth {
            healthy: self.is_healthy(),
            state: self.health.state(),
            consecutive_failures: self.health.consecutive_failures(),
            total_calls: stats.rpc_calls,
            cache_hit_rate: stats.cache_hit_rate,
            recent_latency_ms: (latency != u64::MAX).then_some(latency),
            last_error: self.last_error.lock().expect("last error mutex poisoned").clone(),
            cached_height: self.cached_height(),
            budget: self.budget.usage(),
        }
    }

    /// Charge the budget, run the call with retries, and record the outcome.
    async fn call<T, F, Fut>(&self, method: &'static str, max_wait: Duration, mut op: F) -> RpcResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RpcResult<T>>,
    {
        let result = self
            .settings
            .retry
            .run(method, RpcError::is_retryable, || {
                let attempt = op();
                async move {
                    self.budget.acquire(max_wait).await?;
                    self.stats.record_rpc_call(method);

                    let started = Instant::now();
                    let result = attempt.await;
                    let latency = started.elapsed();
                    self.last_latency_ms
                        .store(latency.as_millis().min(u64::MAX as u128 - 1) as u64, Ordering::Relaxed);
                    metrics::record_rpc_call(method, result.is_ok(), latency);
                    result
                }
            })
            .await;

        match &result {
            Ok(_) => {
                self.health.mark_success();
            }
            Err(e) if e.is_node_failure() => {
                tracing::warn!(method, error = %e, "Node call failed");
                self.health.mark_failure();
                *self.last_error.lock().expect("last error mutex poisoned") = Some(e.to_string());
            }
            Err(e) => {
                *self.last_error.lock().expect("last error mutex poisoned") = Some(e.to_string());
            }
        }
        metrics::record_rpc_health(self.is_healthy());

        result
    }
}

impl std::fmt::Debug for RpcManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcManager")
            .field("settings", &self.settings)
            .field("budget", &self.budget)
            .field("health", &self.health.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::source::testing::StubChain;
    use alloy::primitives::B256;

    fn settings() -> RpcSettings {
        RpcSettings {
            cache_ttl: Duration::from_millis(1500),
            max_budget_wait: Duration::from_secs(2),
            max_calls_per_second: 100,
            max_calls_per_day: 10_000,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
            },
            unhealthy_threshold: 2,
            healthy_threshold: 1,
        }
    }

    fn manager(chain: Arc<StubChain>, settings: RpcSettings) -> RpcManager {
        RpcManager::new(chain, settings, Arc::new(PerformanceMetrics::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_height_served_from_cache_within_ttl() {
        let chain = Arc::new(StubChain::default());
        chain.set_height(100);
        let rpc = manager(chain.clone(), settings());

        assert_eq!(rpc.current_block_height().await.unwrap(), 100);
        chain.set_height(101);
        assert_eq!(rpc.current_block_height().await.unwrap(), 100);
        assert_eq!(chain.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(rpc.current_block_height().await.unwrap(), 101);
        assert_eq!(chain.calls.load(Ordering::SeqCst), 2);

        let health = rpc.health();
        assert_eq!(health.total_calls, 2);
        assert!((health.cache_hit_rate - 100.0 / 3.0).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_without_cache() {
        let chain = Arc::new(StubChain::default());
        let mut s = settings();
        s.max_calls_per_second = 1;
        s.max_calls_per_day = 1;
        let rpc = manager(chain, s);

        rpc.get_block(1, false).await.unwrap_err();
        let err = rpc.current_block_height().await.unwrap_err();
        assert!(matches!(err, RpcError::RateLimited(_)));
        assert!(rpc.health().last_error.unwrap().contains("per-day"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_height_when_budget_exhausted() {
        let chain = Arc::new(StubChain::default());
        chain.set_height(7);
        let mut s = settings();
        s.max_calls_per_day = 1;
        let rpc = manager(chain.clone(), s);

        assert_eq!(rpc.current_block_height().await.unwrap(), 7);
        chain.set_height(8);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(rpc.current_block_height().await.unwrap(), 7);
        assert_eq!(chain.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_retried() {
        let chain = Arc::new(StubChain::default());
        chain.set_height(42);
        chain.fail_times(2);
        let rpc = manager(chain.clone(), settings());

        assert_eq!(rpc.current_block_height().await.unwrap(), 42);
        assert_eq!(chain.calls.load(Ordering::SeqCst), 3);
        assert!(rpc.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_after_consecutive_failures() {
        let chain = Arc::new(StubChain::default());
        chain.fail_times(100);
        let rpc = manager(chain, settings());

        assert!(rpc.get_block(5, true).await.is_err());
        assert!(rpc.is_healthy());
        let err = rpc.get_block(5, true).await.unwrap_err();
        assert!(matches!(err, RpcError::NodeUnavailable(_)));
        assert!(!rpc.is_healthy());
        assert_eq!(rpc.health().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_missing_block_is_not_found() {
        let chain = Arc::new(StubChain::default());
        chain.insert_block(BlockData {
            number: 3,
            hash: B256::repeat_byte(3),
            parent_hash: B256::ZERO,
            timestamp: 0,
            transactions: Vec::new(),
        });
        let rpc = manager(chain, settings());

        assert_eq!(rpc.get_block(3, false).await.unwrap().hash, B256::repeat_byte(3));
        assert_eq!(rpc.get_block(4, false).await.unwrap_err(), RpcError::BlockNotFound(4));
        assert!(rpc.is_healthy());
    }

    #[tokio::test]
    async fn test_connection_and_chain_id() {
        let chain = Arc::new(StubChain::default());
        chain.set_height(9);
        let rpc = manager(chain, settings());

        let info = rpc.test_connection().await.unwrap();
        assert_eq!(info, ConnectionInfo { height: 9, chain_id: 56 });
        assert!(rpc.verify_chain_id(56).await.is_ok());
        assert_eq!(
            rpc.verify_chain_id(1).await.unwrap_err(),
            RpcError::ChainMismatch { expected: 1, actual: 56 }
        );
    }
}

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the monitor.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::monitor::policy::Strategy;

/// Root configuration for the transfer monitor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MonitorConfig {
    /// Chain being observed (endpoint, finality, token registry).
    pub chain: ChainConfig,

    /// RPC access layer tuning (timeouts, cache, call budget).
    pub rpc: RpcConfig,

    /// Retry configuration for node calls.
    pub retries: RetryConfig,

    /// Initial monitoring policy.
    pub policy: PolicyConfig,

    /// Scan loop cadence and confirmation timeouts.
    pub scanner: ScannerConfig,

    /// Health thresholds.
    pub health: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Watch-list feed settings.
    pub feed: FeedConfig,

    /// Delivery of terminal events.
    pub notifier: NotifierConfig,
}

/// Per-chain settings. Turned into a `ChainProfile` at startup.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Short chain name used in logs and transaction records (e.g. "bsc").
    pub name: String,

    /// Primary JSON-RPC endpoint.
    pub rpc_url: String,

    /// Fallback endpoints tried in order when the primary fails.
    pub failover_urls: Vec<String>,

    /// Expected chain id. Checked against the node at startup when set.
    pub chain_id: Option<u64>,

    /// Native coin symbol (e.g. "ETH", "BNB").
    pub native_symbol: String,

    /// Base number of confirmations before a transfer is final.
    pub confirmation_blocks: u64,

    /// Average block interval in seconds.
    pub block_time_secs: u64,

    /// Extra blocks required for L1 finality on layer-2 chains.
    pub l1_finality_blocks: Option<u64>,

    /// Block explorer base URL, only used to build links in log lines.
    pub explorer_url: Option<String>,

    /// ERC-20 contracts monitored on this chain.
    pub tokens: Vec<TokenConfig>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            name: "ethereum".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: None,
            native_symbol: "ETH".to_string(),
            confirmation_blocks: 12,
            block_time_secs: 12,
            l1_finality_blocks: None,
            explorer_url: None,
            tokens: Vec::new(),
        }
    }
}

/// A registered ERC-20 token contract.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TokenConfig {
    /// Token symbol, used as the threshold key.
    pub symbol: String,

    /// Contract address (0x-prefixed hex).
    pub contract: String,

    /// Decimal places of the token.
    #[serde(default = "default_token_decimals")]
    pub decimals: u8,
}

fn default_token_decimals() -> u8 {
    18
}

/// Chain access layer configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,

    /// Block height cache lifetime in milliseconds.
    pub cache_ttl_ms: u64,

    /// Maximum node calls per second.
    pub max_calls_per_second: u32,

    /// Maximum node calls per day.
    pub max_calls_per_day: u32,

    /// Longest a call waits for budget before failing as rate limited.
    pub max_budget_wait_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            cache_ttl_ms: 1500,
            max_calls_per_second: 4,
            max_calls_per_day: 90_000,
            max_budget_wait_ms: 5_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Maximum number of attempts per call, including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

/// Initial monitoring policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Active strategy.
    pub strategy: Strategy,

    /// Minimum amount per symbol (human units) under the threshold strategy.
    pub thresholds: BTreeMap<String, f64>,

    /// Amount per symbol at which a transfer is considered high value.
    /// A `default` entry applies to symbols without their own value.
    pub high_value_thresholds: BTreeMap<String, f64>,

    /// Confirmations added on top of the chain target for high-value transfers.
    pub high_value_extra_confirmations: u64,

    /// Addresses watched under the watch-address strategy.
    pub watch_addresses: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        let mut thresholds = BTreeMap::new();
        thresholds.insert("ETH".to_string(), 1.0);
        thresholds.insert("USDT".to_string(), 10_000.0);
        thresholds.insert("USDC".to_string(), 10_000.0);

        Self {
            strategy: Strategy::AmountThreshold,
            thresholds,
            high_value_thresholds: BTreeMap::new(),
            high_value_extra_confirmations: 5,
            watch_addresses: Vec::new(),
        }
    }
}

/// Scan loop configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Delay between scan ticks in milliseconds.
    pub scan_interval_ms: u64,

    /// Seconds a candidate may stay pending before it times out.
    pub transaction_timeout_secs: u64,

    /// Upper bound on blocks scanned in one tick.
    pub max_blocks_per_tick: u64,

    /// First block to scan. Defaults to the chain head at startup.
    pub start_block: Option<u64>,

    /// Capacity of the queued watch-list update channel.
    pub update_queue_capacity: usize,

    /// Interval between statistics summaries in the log.
    pub stats_log_interval_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: 1_000,
            transaction_timeout_secs: 300,
            max_blocks_per_tick: 20,
            start_block: None,
            update_queue_capacity: 1_024,
            stats_log_interval_secs: 300,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,

    /// Pending set size at which the monitor reports itself unhealthy.
    pub max_pending: usize,

    /// Age of the oldest pending entry at which the monitor reports unhealthy.
    pub max_pending_age_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            unhealthy_threshold: 3,
            healthy_threshold: 1,
            max_pending: 100,
            max_pending_age_secs: 3_600,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Watch-list feed configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FeedConfig {
    /// Read JSON-lines watch updates from stdin.
    pub stdin_enabled: bool,
}

/// Terminal event delivery. Events are only logged without a webhook.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Endpoint receiving a JSON POST per terminal event.
    pub webhook_url: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Attempts per delivery before the event waits for the next tick.
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds.
    pub retry_delay_ms: u64,

    /// Post only confirmed transfers; reorged and timed-out ones are logged.
    pub confirmed_only: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 30,
            max_attempts: 3,
            retry_delay_ms: 5_000,
            confirmed_only: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: MonitorConfig = toml::from_str(
            r#"
            [chain]
            name = "bsc"
            rpc_url = "https://bsc-dataseed.binance.org"
            native_symbol = "BNB"
            "#,
        )
        .unwrap();

        assert_eq!(config.chain.name, "bsc");
        assert_eq!(config.chain.confirmation_blocks, 12);
        assert_eq!(config.rpc.cache_ttl_ms, 1500);
        assert_eq!(config.rpc.max_calls_per_second, 4);
        assert_eq!(config.scanner.transaction_timeout_secs, 300);
        assert_eq!(config.policy.strategy, Strategy::AmountThreshold);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
        assert_eq!(config.notifier.webhook_url, None);
        assert!(config.notifier.confirmed_only);
    }

    #[test]
    fn test_notifier_section() {
        let config: MonitorConfig = toml::from_str(
            r#"
            [notifier]
            webhook_url = "https://hooks.example.com/deposits"
            timeout_secs = 5
            confirmed_only = false
            "#,
        )
        .unwrap();

        assert_eq!(config.notifier.webhook_url.as_deref(), Some("https://hooks.example.com/deposits"));
        assert_eq!(config.notifier.timeout_secs, 5);
        assert_eq!(config.notifier.max_attempts, 3);
        assert!(!config.notifier.confirmed_only);
    }

    #[test]
    fn test_full_policy_section() {
        let config: MonitorConfig = toml::from_str(
            r#"
            [policy]
            strategy = "watch_address"
            watch_addresses = ["0x00000000000000000000000000000000000000aa"]
            high_value_extra_confirmations = 7

            [policy.thresholds]
            USDT = 100
            BNB = 0.5

            [policy.high_value_thresholds]
            default = 50000

            [[chain.tokens]]
            symbol = "USDT"
            contract = "0x55d398326f99059fF775485246999027B3197955"
            "#,
        )
        .unwrap();

        assert_eq!(config.policy.strategy, Strategy::WatchAddress);
        assert_eq!(config.policy.thresholds["USDT"], 100.0);
        assert_eq!(config.policy.thresholds["BNB"], 0.5);
        assert_eq!(config.policy.high_value_thresholds["default"], 50_000.0);
        assert_eq!(config.policy.high_value_extra_confirmations, 7);
        assert_eq!(config.chain.tokens[0].decimals, 18);
    }
}

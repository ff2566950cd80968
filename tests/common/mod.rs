//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;

use evm_transfer_monitor::blockchain::{BlockData, ChainSource, ReceiptData, RpcError, RpcResult, RpcSettings, TxData};
use evm_transfer_monitor::chain::ChainProfile;
use evm_transfer_monitor::monitor::erc20::transferCall;
use evm_transfer_monitor::monitor::{ChannelNotifier, Monitor, MonitorPolicy, MonitorSettings, TerminalEvent};
use evm_transfer_monitor::resilience::RetryPolicy;

pub const USDT: Address = Address::repeat_byte(0x55);
pub const SENDER: Address = Address::repeat_byte(0x01);
pub const RECIPIENT: Address = Address::repeat_byte(0xaa);

/// In-memory chain with programmable height, reorgs and outages.
#[derive(Default)]
pub struct MockChain {
    height: AtomicU64,
    blocks: Mutex<HashMap<u64, BlockData>>,
    receipts: Mutex<HashMap<TxHash, ReceiptData>>,
    calls: Mutex<HashMap<&'static str, u64>>,
    fail_next: AtomicU64,
    down: AtomicBool,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Add a block and a successful receipt for each of its transactions.
    pub fn add_block(&self, number: u64, transactions: Vec<TxData>) {
        let hash = block_hash(number, 0);
        let mut receipts = self.receipts.lock().unwrap();
        for tx in &transactions {
            receipts.insert(
                tx.hash,
                ReceiptData {
                    tx_hash: tx.hash,
                    block_number: Some(number),
                    block_hash: Some(hash),
                    succeeded: true,
                    gas_used: 50_000,
                    effective_gas_price: tx.gas_price,
                },
            );
        }
        self.blocks.lock().unwrap().insert(
            number,
            BlockData {
                number,
                hash,
                parent_hash: block_hash(number.saturating_sub(1), 0),
                timestamp: 1_700_000_000 + number * 3,
                transactions,
            },
        );
    }

    /// Add empty blocks for the whole range.
    pub fn add_empty_blocks(&self, range: std::ops::RangeInclusive<u64>) {
        for number in range {
            self.add_block(number, Vec::new());
        }
    }

    /// Replace the block at `number` with a sibling and drop its receipts.
    pub fn reorg(&self, number: u64) {
        let mut blocks = self.blocks.lock().unwrap();
        if let Some(block) = blocks.get_mut(&number) {
            block.hash = block_hash(number, 1);
            let mut receipts = self.receipts.lock().unwrap();
            for tx in block.transactions.drain(..) {
                receipts.remove(&tx.hash);
            }
        }
    }

    pub fn fail_times(&self, n: u64) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self, method: &str) -> u64 {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u64 {
        self.calls.lock().unwrap().values().sum()
    }

    fn enter(&self, method: &'static str) -> RpcResult<()> {
        *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
        if self.down.load(Ordering::SeqCst) {
            return Err(RpcError::NodeUnavailable("connection refused".into()));
        }
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(RpcError::NodeUnavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn block_number(&self) -> RpcResult<u64> {
        self.enter("eth_blockNumber")?;
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn block(&self, number: u64, full_transactions: bool) -> RpcResult<Option<BlockData>> {
        self.enter("eth_getBlockByNumber")?;
        Ok(self.blocks.lock().unwrap().get(&number).cloned().map(|mut block| {
            if !full_transactions {
                block.transactions.clear();
            }
            block
        }))
    }

    async fn transaction_receipt(&self, hash: TxHash) -> RpcResult<Option<ReceiptData>> {
        self.enter("eth_getTransactionReceipt")?;
        Ok(self.receipts.lock().unwrap().get(&hash).cloned())
    }

    async fn chain_id(&self) -> RpcResult<u64> {
        self.enter("eth_chainId")?;
        Ok(56)
    }
}

pub fn block_hash(number: u64, fork: u8) -> B256 {
    let mut bytes = [fork; 32];
    bytes[24..].copy_from_slice(&number.to_be_bytes());
    B256::from(bytes)
}

/// A `transfer(to, amount)` call on the USDT contract.
pub fn usdt_transfer(id: u8, to: Address, raw_amount: u64) -> TxData {
    TxData {
        hash: TxHash::repeat_byte(id),
        index: 0,
        from: SENDER,
        to: Some(USDT),
        value: U256::ZERO,
        input: Bytes::from(transferCall { to, amount: U256::from(raw_amount) }.abi_encode()),
        gas_limit: 60_000,
        gas_price: 3_000_000_000,
    }
}

/// A plain BNB payment of `wei` from `SENDER`.
pub fn native_transfer(id: u8, to: Address, wei: U256) -> TxData {
    TxData {
        hash: TxHash::repeat_byte(id),
        index: 0,
        from: SENDER,
        to: Some(to),
        value: wei,
        input: Bytes::new(),
        gas_limit: 21_000,
        gas_price: 3_000_000_000,
    }
}

/// `n` whole coins at 18 decimals.
pub fn coins(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u8))
}

pub fn bsc_profile() -> ChainProfile {
    ChainProfile::new("bsc", "BNB", 12)
        .with_token("USDT", USDT, 6)
        .with_block_time(Duration::from_secs(3))
}

/// Fast loop settings with a generous call budget.
pub fn settings() -> MonitorSettings {
    let mut settings = MonitorSettings::default();
    settings.scan_interval = Duration::from_millis(100);
    settings.transaction_timeout = Duration::from_secs(300);
    settings.stats_log_interval = Duration::ZERO;
    settings.rpc = RpcSettings {
        cache_ttl: Duration::from_millis(50),
        max_budget_wait: Duration::from_secs(1),
        max_calls_per_second: 1_000,
        max_calls_per_day: 1_000_000,
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
        unhealthy_threshold: 2,
        healthy_threshold: 1,
    };
    settings
}

pub fn monitor_with(
    chain: Arc<MockChain>,
    policy: MonitorPolicy,
    settings: MonitorSettings,
) -> (Monitor, tokio::sync::mpsc::Receiver<TerminalEvent>) {
    let (notifier, events) = ChannelNotifier::new(64);
    let monitor = Monitor::new(bsc_profile(), chain, policy, Arc::new(notifier), settings);
    (monitor, events)
}

/// Let the paused clock run the loop for `duration`.
pub async fn run_for(duration: Duration) {
    tokio::time::sleep(duration).await;
}

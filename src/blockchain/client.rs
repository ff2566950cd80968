//! Blockchain RPC client with timeout and failover handling.
//!
//! # Responsibilities
//! - Connect to the primary JSON-RPC endpoint and its failovers
//! - Fetch block heights, blocks and receipts
//! - Bound every call with a timeout and fall through to the next endpoint
//! - Convert alloy RPC types into the monitor's block/receipt records

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::Transaction as ConsensusTx;
use alloy::eips::BlockNumberOrTag;
use alloy::network::TransactionResponse;
use alloy::primitives::TxHash;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Block, Transaction, TransactionReceipt};
use async_trait::async_trait;
use tokio::time::timeout;

use crate::blockchain::source::ChainSource;
use crate::blockchain::types::{BlockData, ReceiptData, RpcError, RpcResult, TxData};

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// alloy-backed `ChainSource` with failover support.
#[derive(Clone)]
pub struct AlloySource {
    /// List of providers (primary + failovers).
    providers: Vec<DynProvider>,
    /// Endpoint URLs, same order as `providers`.
    urls: Vec<String>,
    /// Request timeout duration.
    timeout_duration: Duration,
}

impl AlloySource {
    /// Create a source from endpoint URLs, primary first.
    ///
    /// The primary must parse; unparsable failovers are skipped with a warning.
    pub fn new(urls: &[String], timeout_duration: Duration) -> RpcResult<Self> {
        let (primary, failovers) = urls.split_first().ok_or_else(|| RpcError::InvalidUrl {
            url: String::new(),
            reason: "no RPC endpoint configured".to_string(),
        })?;

        let primary_url: url::Url = primary.parse().map_err(|e: url::ParseError| RpcError::InvalidUrl {
            url: primary.clone(),
            reason: e.to_string(),
        })?;

        let mut providers = vec![Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider];
        let mut kept_urls = vec![primary.clone()];

        for url_str in failovers {
            if let Ok(url) = url_str.parse::<url::Url>() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider);
                kept_urls.push(url_str.clone());
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        tracing::info!(
            rpc_url = %primary,
            failovers = kept_urls.len() - 1,
            timeout_secs = timeout_duration.as_secs(),
            "RPC client initialized"
        );

        Ok(Self {
            providers,
            urls: kept_urls,
            timeout_duration,
        })
    }

    /// Run `call` against each provider in order until one answers.
    async fn with_failover<T, E, F, Fut>(&self, method: &'static str, call: F) -> RpcResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_error = String::new();
        let mut all_timed_out = true;

        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, call(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    all_timed_out = false;
                    tracing::warn!(provider_idx = i, method, error = %e, "RPC error, trying next provider");
                    last_error = e.to_string();
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, method, "RPC timeout, trying next provider");
                }
            }
        }

        if all_timed_out {
            Err(RpcError::Timeout(self.timeout_duration.as_secs()))
        } else {
            Err(RpcError::NodeUnavailable(format!(
                "all {} providers failed {}: {}",
                self.providers.len(),
                method,
                last_error
            )))
        }
    }
}

#[async_trait]
impl ChainSource for AlloySource {
    async fn block_number(&self) -> RpcResult<u64> {
        self.with_failover("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await
    }

    async fn block(&self, number: u64, full_transactions: bool) -> RpcResult<Option<BlockData>> {
        let block = self
            .with_failover("eth_getBlockByNumber", |p| async move {
                let request = p.get_block_by_number(BlockNumberOrTag::Number(number));
                if full_transactions {
                    request.full().await
                } else {
                    request.hashes().await
                }
            })
            .await?;

        Ok(block.map(convert_block))
    }

    async fn transaction_receipt(&self, hash: TxHash) -> RpcResult<Option<ReceiptData>> {
        let receipt = self
            .with_failover("eth_getTransactionReceipt", |p| async move {
                p.get_transaction_receipt(hash).await
            })
            .await?;

        Ok(receipt.map(convert_receipt))
    }

    async fn chain_id(&self) -> RpcResult<u64> {
        self.with_failover("eth_chainId", |p| async move { p.get_chain_id().await })
            .await
    }
}

impl std::fmt::Debug for AlloySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloySource")
            .field("urls", &self.urls)
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}

fn convert_block(block: Block) -> BlockData {
    let transactions = block
        .transactions
        .txns()
        .enumerate()
        .map(|(position, tx)| convert_transaction(tx, position as u64))
        .collect();

    BlockData {
        number: block.header.number,
        hash: block.header.hash,
        parent_hash: block.header.parent_hash,
        timestamp: block.header.timestamp,
        transactions,
    }
}

fn convert_transaction(tx: &Transaction, position: u64) -> TxData {
    let gas_price = tx
        .effective_gas_price
        .or_else(|| ConsensusTx::gas_price(tx))
        .unwrap_or_else(|| ConsensusTx::max_fee_per_gas(tx));

    TxData {
        hash: TransactionResponse::tx_hash(tx),
        index: tx.transaction_index.unwrap_or(position),
        from: TransactionResponse::from(tx),
        to: ConsensusTx::to(tx),
        value: ConsensusTx::value(tx),
        input: ConsensusTx::input(tx).clone(),
        gas_limit: ConsensusTx::gas_limit(tx),
        gas_price,
    }
}

fn convert_receipt(receipt: TransactionReceipt) -> ReceiptData {
    ReceiptData {
        tx_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
        block_hash: receipt.block_hash,
        succeeded: receipt.status(),
        gas_used: receipt.gas_used,
        effective_gas_price: receipt.effective_gas_price,
    }
}

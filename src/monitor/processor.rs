//! Per-block transaction classification.

use std::sync::Arc;

use alloy::primitives::{Address, U256};

use crate::blockchain::types::{BlockData, TxData};
use crate::chain::profile::{ChainProfile, NATIVE_DECIMALS};
use crate::chain::units::{format_amount, to_display_amount};
use crate::monitor::erc20::{decode_transfer, is_transfer_call};
use crate::monitor::policy::MonitorPolicy;
use crate::monitor::types::TransactionInfo;
use crate::observability::stats::PerformanceMetrics;

/// A transfer before policy evaluation.
struct Movement<'a> {
    symbol: &'a str,
    contract: Option<Address>,
    decimals: u8,
    from: Address,
    to: Address,
    raw_amount: U256,
}

/// Turns blocks into candidate records for one chain.
pub struct TransactionProcessor {
    profile: Arc<ChainProfile>,
    stats: Arc<PerformanceMetrics>,
}

impl TransactionProcessor {
    pub fn new(profile: Arc<ChainProfile>, stats: Arc<PerformanceMetrics>) -> Self {
        Self { profile, stats }
    }

    pub fn profile(&self) -> &ChainProfile {
        &self.profile
    }

    /// Classify every transaction of `block` against one policy snapshot.
    ///
    /// Output keeps transaction-index order. Transactions that are neither
    /// plain value transfers nor token transfers are dropped silently.
    pub fn scan_block(&self, block: &BlockData, policy: &MonitorPolicy, now: u64) -> Vec<TransactionInfo> {
        let mut found = Vec::new();

        for tx in &block.transactions {
            let Some(movement) = self.classify(tx) else {
                continue;
            };

            if movement.from == movement.to {
                self.stats.record_self_transfer();
                continue;
            }

            let Some(reason) =
                policy.evaluate(movement.symbol, movement.raw_amount, movement.decimals, &movement.from, &movement.to)
            else {
                continue;
            };

            let amount = to_display_amount(movement.raw_amount, movement.decimals);
            let high_value = policy.is_high_value(movement.symbol, movement.raw_amount, movement.decimals);

            tracing::info!(
                chain = self.profile.name(),
                block = block.number,
                tx = %tx.hash,
                symbol = movement.symbol,
                amount = %format_amount(amount),
                from = %movement.from,
                to = %movement.to,
                reason = %reason,
                high_value,
                "Transfer candidate found"
            );
            self.stats.record_candidate(movement.symbol, reason);

            found.push(TransactionInfo {
                chain: self.profile.name().to_string(),
                block_number: block.number,
                block_hash: block.hash,
                tx_index: tx.index,
                hash: tx.hash,
                from: movement.from,
                to: movement.to,
                symbol: movement.symbol.to_string(),
                contract: movement.contract,
                raw_amount: movement.raw_amount,
                amount,
                gas_cost_wei: U256::from(tx.gas_limit) * U256::from(tx.gas_price),
                reason,
                high_value,
                discovered_at: now,
            });
        }

        found
    }

    /// Confirmation target for a candidate under `policy`.
    pub fn required_confirmations(&self, info: &TransactionInfo, policy: &MonitorPolicy) -> u64 {
        self.profile
            .required_confirmations(info.high_value, policy.high_value_bonus())
    }

    fn classify<'a>(&'a self, tx: &TxData) -> Option<Movement<'a>> {
        let to = tx.to?;
        let token = self.profile.token_by_contract(&to);

        if tx.input.is_empty() {
            // plain value sent to a token contract is not a native payment
            if tx.value.is_zero() || token.is_some() {
                return None;
            }
            return Some(Movement {
                symbol: self.profile.native_symbol(),
                contract: None,
                decimals: NATIVE_DECIMALS,
                from: tx.from,
                to,
                raw_amount: tx.value,
            });
        }

        let token = token?;
        if !is_transfer_call(&tx.input) {
            return None;
        }

        match decode_transfer(&tx.input) {
            Ok(transfer) => {
                self.stats.record_token_transfer();
                Some(Movement {
                    symbol: &token.symbol,
                    contract: Some(token.contract),
                    decimals: token.decimals,
                    from: transfer.from.unwrap_or(tx.from),
                    to: transfer.to,
                    raw_amount: transfer.amount,
                })
            }
            Err(e) => {
                tracing::debug!(tx = %tx.hash, token = %token.symbol, error = %e, "Skipping undecodable token call");
                self.stats.record_decode_failure();
                None
            }
        }
    }
}

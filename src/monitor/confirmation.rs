//! Confirmation tracking for accepted candidates.
//!
//! Every entry is `Pending` until exactly one terminal transition, after
//! which it is reported once and removed. Status only changes inside
//! `check_all` and `sweep_timeouts`.
//!
//! The inclusion hash is compared once per distinct inclusion block per
//! pass, so a reorg that happens and is undone between two passes goes
//! unnoticed.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use alloy::primitives::{TxHash, B256};

use crate::blockchain::manager::RpcManager;
use crate::blockchain::types::ReceiptData;
use crate::monitor::types::{ConfirmationStatus, PendingConfirmation, TerminalEvent, TransactionInfo};

/// Result of comparing an inclusion block against the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashCheck {
    Matches,
    Changed,
    Unknown,
}

/// Owns the set of candidates awaiting finality.
#[derive(Debug)]
pub struct ConfirmationEngine {
    timeout: Duration,
    pending: HashMap<TxHash, PendingConfirmation>,
}

impl ConfirmationEngine {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: HashMap::new(),
        }
    }

    /// Start tracking `info`. Returns false when the hash is already pending.
    pub fn track(&mut self, info: TransactionInfo, required_confirmations: u64, now: u64) -> bool {
        if self.pending.contains_key(&info.hash) {
            return false;
        }

        tracing::debug!(
            tx = %info.hash,
            block = info.block_number,
            required_confirmations,
            "Tracking candidate"
        );
        self.pending.insert(
            info.hash,
            PendingConfirmation {
                inclusion_block: info.block_number,
                inclusion_hash: info.block_hash,
                required_confirmations,
                first_seen: now,
                last_checked: now,
                hash_verified_at: None,
                status: ConfirmationStatus::Pending,
                receipt_succeeded: None,
                info,
            },
        );
        true
    }

    /// Re-evaluate every pending entry against `current_height`.
    ///
    /// Node failures leave an entry pending; its timeout is still evaluated.
    pub async fn check_all(&mut self, rpc: &RpcManager, current_height: u64, now: u64) -> Vec<TerminalEvent> {
        let timeout_secs = self.timeout.as_secs();
        let mut block_hashes: HashMap<u64, Option<B256>> = HashMap::new();

        for key in self.ordered_keys() {
            let Some(entry) = self.pending.get(&key) else {
                continue;
            };
            let inclusion_block = entry.inclusion_block;
            let inclusion_hash = entry.inclusion_hash;
            let reached = current_height >= inclusion_block
                && current_height - inclusion_block >= entry.required_confirmations;
            let needs_hash = reached || entry.hash_verified_at != Some(current_height);

            let hash_check = if needs_hash {
                let fresh = match block_hashes.get(&inclusion_block) {
                    Some(hash) => *hash,
                    None => {
                        let hash = fetch_block_hash(rpc, inclusion_block).await;
                        block_hashes.insert(inclusion_block, hash);
                        hash
                    }
                };
                match fresh {
                    Some(hash) if hash == inclusion_hash => HashCheck::Matches,
                    Some(_) => HashCheck::Changed,
                    None => HashCheck::Unknown,
                }
            } else {
                HashCheck::Unknown
            };

            let outcome = match hash_check {
                HashCheck::Changed => Some((ConfirmationStatus::Reorged, None)),
                HashCheck::Matches if reached => verify_receipt(rpc, key, inclusion_block, inclusion_hash).await,
                _ => None,
            };

            let Some(entry) = self.pending.get_mut(&key) else {
                continue;
            };
            entry.last_checked = now;
            if hash_check == HashCheck::Matches {
                entry.hash_verified_at = Some(current_height);
            }

            match outcome {
                Some((status, receipt_succeeded)) => {
                    entry.status = status;
                    entry.receipt_succeeded = receipt_succeeded;
                }
                None if now.saturating_sub(entry.first_seen) >= timeout_secs => {
                    entry.status = ConfirmationStatus::TimedOut;
                }
                None => {}
            }
        }

        self.drain_terminal(Some(current_height))
    }

    /// Timeout-only pass, for ticks where the height is unavailable.
    pub fn sweep_timeouts(&mut self, now: u64) -> Vec<TerminalEvent> {
        let timeout_secs = self.timeout.as_secs();
        for entry in self.pending.values_mut() {
            entry.last_checked = now;
            if now.saturating_sub(entry.first_seen) >= timeout_secs {
                entry.status = ConfirmationStatus::TimedOut;
            }
        }
        self.drain_terminal(None)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, hash: &TxHash) -> bool {
        self.pending.contains_key(hash)
    }

    pub fn oldest_first_seen(&self) -> Option<u64> {
        self.pending.values().map(|e| e.first_seen).min()
    }

    /// Seconds since the oldest entry was first seen.
    pub fn oldest_pending_age(&self, now: u64) -> Option<u64> {
        self.oldest_first_seen()
            .map(|first_seen| now.saturating_sub(first_seen))
    }

    pub fn pending_by_symbol(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.pending.values() {
            *counts.entry(entry.info.symbol.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Pending entries per inclusion block.
    pub fn pending_by_block(&self) -> BTreeMap<u64, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.pending.values() {
            *counts.entry(entry.inclusion_block).or_insert(0) += 1;
        }
        counts
    }

    /// Drop every pending entry without reporting it.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Pending keys in inclusion order.
    fn ordered_keys(&self) -> Vec<TxHash> {
        let mut keys: Vec<_> = self
            .pending
            .values()
            .map(|e| (e.inclusion_block, e.info.tx_index, e.info.hash))
            .collect();
        keys.sort();
        keys.into_iter().map(|(_, _, hash)| hash).collect()
    }

    /// Remove terminal entries and report them in inclusion order. Without a
    /// current height, depth is taken from the last verified height.
    fn drain_terminal(&mut self, current_height: Option<u64>) -> Vec<TerminalEvent> {
        let mut terminal: Vec<_> = self
            .pending
            .iter()
            .filter(|(_, e)| e.status.is_terminal())
            .map(|(hash, e)| (e.inclusion_block, e.info.tx_index, *hash))
            .collect();
        terminal.sort();

        terminal
            .into_iter()
            .filter_map(|(_, _, hash)| self.pending.remove(&hash))
            .map(|entry| {
                let confirmations = current_height
                    .or(entry.hash_verified_at)
                    .map_or(0, |height| height.saturating_sub(entry.inclusion_block));
                log_terminal(&entry, confirmations);
                TerminalEvent {
                    status: entry.status,
                    confirmations,
                    required_confirmations: entry.required_confirmations,
                    receipt_succeeded: entry.receipt_succeeded,
                    transaction: entry.info,
                }
            })
            .collect()
    }
}

/// At target depth the receipt must still place the transaction in the
/// inclusion block.
async fn verify_receipt(
    rpc: &RpcManager,
    hash: TxHash,
    number: u64,
    block_hash: B256,
) -> Option<(ConfirmationStatus, Option<bool>)> {
    match rpc.get_transaction_receipt(hash).await {
        Ok(Some(receipt)) if in_block(&receipt, number, block_hash) => {
            Some((ConfirmationStatus::Confirmed, Some(receipt.succeeded)))
        }
        Ok(_) => Some((ConfirmationStatus::Reorged, None)),
        Err(e) => {
            tracing::debug!(tx = %hash, error = %e, "Receipt lookup failed, staying pending");
            None
        }
    }
}

fn in_block(receipt: &ReceiptData, number: u64, hash: B256) -> bool {
    match receipt.block_hash {
        Some(block_hash) => block_hash == hash,
        None => receipt.block_number == Some(number),
    }
}

async fn fetch_block_hash(rpc: &RpcManager, number: u64) -> Option<B256> {
    match rpc.get_block(number, false).await {
        Ok(block) => Some(block.hash),
        Err(e) => {
            tracing::debug!(block = number, error = %e, "Inclusion block lookup failed");
            None
        }
    }
}

fn log_terminal(entry: &PendingConfirmation, confirmations: u64) {
    let info = &entry.info;
    match entry.status {
        ConfirmationStatus::Confirmed => tracing::info!(
            tx = %info.hash,
            symbol = %info.symbol,
            amount = info.amount,
            block = entry.inclusion_block,
            confirmations,
            succeeded = entry.receipt_succeeded,
            "Transfer confirmed"
        ),
        ConfirmationStatus::TimedOut => tracing::warn!(
            tx = %info.hash,
            symbol = %info.symbol,
            block = entry.inclusion_block,
            waited_secs = entry.last_checked.saturating_sub(entry.first_seen),
            "Transfer timed out before confirmation"
        ),
        ConfirmationStatus::Reorged => tracing::warn!(
            tx = %info.hash,
            symbol = %info.symbol,
            block = entry.inclusion_block,
            "Transfer dropped by chain reorganization"
        ),
        ConfirmationStatus::Pending => {}
    }
}

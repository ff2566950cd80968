//! Transfer monitoring types.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::{Address, TxHash, B256, U256};
use serde::{Deserialize, Serialize};

/// Which policy accepted a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    /// Amount at or above the symbol's minimum.
    AmountThreshold,
    /// Recipient is on the watch list.
    WatchedRecipient,
    /// Sender is on the watch list.
    WatchedSender,
}

impl MatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchReason::AmountThreshold => "amount_threshold",
            MatchReason::WatchedRecipient => "watched_recipient",
            MatchReason::WatchedSender => "watched_sender",
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A qualifying transfer. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub chain: String,
    pub block_number: u64,
    pub block_hash: B256,
    pub tx_index: u64,
    pub hash: TxHash,
    pub from: Address,
    pub to: Address,
    pub symbol: String,
    /// Token contract; `None` for the native coin.
    pub contract: Option<Address>,
    /// Amount in the smallest unit.
    pub raw_amount: U256,
    /// Decimal-adjusted amount, for display.
    pub amount: f64,
    /// `gas limit * gas price` in wei.
    pub gas_cost_wei: U256,
    pub reason: MatchReason,
    pub high_value: bool,
    /// Unix seconds.
    pub discovered_at: u64,
}

impl TransactionInfo {
    pub fn is_native(&self) -> bool {
        self.contract.is_none()
    }
}

/// Confirmation state of a tracked candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    TimedOut,
    Reorged,
}

impl ConfirmationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationStatus::Pending => "pending",
            ConfirmationStatus::Confirmed => "confirmed",
            ConfirmationStatus::TimedOut => "timed_out",
            ConfirmationStatus::Reorged => "reorged",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConfirmationStatus::Pending)
    }
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate waiting for finality. Owned by the confirmation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingConfirmation {
    pub info: TransactionInfo,
    pub inclusion_block: u64,
    pub inclusion_hash: B256,
    pub required_confirmations: u64,
    /// Unix seconds.
    pub first_seen: u64,
    /// Unix seconds of the latest `check_all` pass.
    pub last_checked: u64,
    /// Chain height at which the inclusion hash was last compared.
    pub hash_verified_at: Option<u64>,
    pub status: ConfirmationStatus,
    /// Execution status from the receipt fetched at confirmation time.
    pub receipt_succeeded: Option<bool>,
}

/// Emitted once per terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalEvent {
    pub status: ConfirmationStatus,
    pub transaction: TransactionInfo,
    pub confirmations: u64,
    pub required_confirmations: u64,
    /// Execution status from the receipt, when one was fetched.
    pub receipt_succeeded: Option<bool>,
}

/// Wall-clock unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_event_serde() {
        let event = TerminalEvent {
            status: ConfirmationStatus::Confirmed,
            transaction: TransactionInfo {
                chain: "bsc".to_string(),
                block_number: 100,
                block_hash: B256::ZERO,
                tx_index: 3,
                hash: TxHash::ZERO,
                from: Address::ZERO,
                to: Address::repeat_byte(0xaa),
                symbol: "USDT".to_string(),
                contract: Some(Address::repeat_byte(0x55)),
                raw_amount: U256::from(250_000_000u64),
                amount: 250.0,
                gas_cost_wei: U256::from(21_000u64),
                reason: MatchReason::AmountThreshold,
                high_value: false,
                discovered_at: 1_700_000_000,
            },
            confirmations: 12,
            required_confirmations: 12,
            receipt_succeeded: Some(true),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"status\":\"confirmed\""));
        assert!(json.contains("\"reason\":\"amount_threshold\""));
        let decoded: TerminalEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_status_terminality() {
        assert!(!ConfirmationStatus::Pending.is_terminal());
        assert!(ConfirmationStatus::Confirmed.is_terminal());
        assert!(ConfirmationStatus::TimedOut.is_terminal());
        assert!(ConfirmationStatus::Reorged.is_terminal());
    }
}

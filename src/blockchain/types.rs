//! Chain access types and error definitions.

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use thiserror::Error;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Errors that can occur while talking to the node.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    /// Call budget exhausted and the wait would exceed the configured maximum.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Network or transport failure on every configured endpoint.
    #[error("Node unavailable: {0}")]
    NodeUnavailable(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// The node has not produced (or does not serve) this block yet.
    #[error("Block {0} not available")]
    BlockNotFound(u64),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Endpoint URL could not be parsed.
    #[error("Invalid RPC URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl RpcError {
    /// Transport-level failures worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::NodeUnavailable(_) | RpcError::Timeout(_))
    }

    /// Failures that count against node health.
    pub fn is_node_failure(&self) -> bool {
        self.is_retryable()
    }
}

/// Result type for chain access operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// A transaction as seen inside a fetched block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxData {
    pub hash: TxHash,
    /// Position inside the block.
    pub index: u64,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
    /// Effective price when known, otherwise the legacy or max fee.
    pub gas_price: u128,
}

/// A fetched block. `transactions` is empty when fetched without bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub transactions: Vec<TxData>,
}

/// The subset of a receipt the monitor needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptData {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub block_hash: Option<B256>,
    pub succeeded: bool,
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_conversion() {
        let chain_id = ChainId::from(56u64);
        assert_eq!(chain_id.0, 56);
        assert_eq!(u64::from(chain_id), 56);
    }

    #[test]
    fn test_error_display() {
        let err = RpcError::Timeout(10);
        assert_eq!(err.to_string(), "RPC timeout after 10 seconds");

        let err = RpcError::ChainMismatch {
            expected: 56,
            actual: 1,
        };
        assert!(err.to_string().contains("expected 56"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(RpcError::NodeUnavailable("connection refused".into()).is_retryable());
        assert!(RpcError::Timeout(5).is_retryable());
        assert!(!RpcError::RateLimited("per-day budget".into()).is_retryable());
        assert!(!RpcError::BlockNotFound(7).is_retryable());
    }
}

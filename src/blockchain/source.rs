//! The node-facing seam of the chain access layer.

use alloy::primitives::TxHash;
use async_trait::async_trait;

use crate::blockchain::types::{BlockData, ReceiptData, RpcResult};

/// Raw node access. Implementations do no caching, budgeting or retrying;
/// `RpcManager` layers those on top.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// `eth_blockNumber`.
    async fn block_number(&self) -> RpcResult<u64>;

    /// `eth_getBlockByNumber`, with full transaction bodies when requested.
    async fn block(&self, number: u64, full_transactions: bool) -> RpcResult<Option<BlockData>>;

    /// `eth_getTransactionReceipt`.
    async fn transaction_receipt(&self, hash: TxHash) -> RpcResult<Option<ReceiptData>>;

    /// `eth_chainId`. Only used at startup.
    async fn chain_id(&self) -> RpcResult<u64>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Minimal in-memory source for unit tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use alloy::primitives::{TxHash, B256};
    use async_trait::async_trait;

    use super::ChainSource;
    use crate::blockchain::types::{BlockData, ReceiptData, RpcError, RpcResult};

    #[derive(Default)]
    pub struct StubChain {
        pub height: AtomicU64,
        pub blocks: Mutex<HashMap<u64, BlockData>>,
        pub receipts: Mutex<HashMap<TxHash, ReceiptData>>,
        pub calls: AtomicU64,
        pub fail_next: AtomicU64,
    }

    impl StubChain {
        pub fn set_height(&self, height: u64) {
            self.height.store(height, Ordering::SeqCst);
        }

        pub fn insert_block(&self, block: BlockData) {
            self.blocks.lock().unwrap().insert(block.number, block);
        }

        pub fn rewrite_block_hash(&self, number: u64, hash: B256) {
            if let Some(block) = self.blocks.lock().unwrap().get_mut(&number) {
                block.hash = hash;
            }
        }

        pub fn insert_receipt(&self, receipt: ReceiptData) {
            self.receipts.lock().unwrap().insert(receipt.tx_hash, receipt);
        }

        pub fn fail_times(&self, n: u64) {
            self.fail_next.store(n, Ordering::SeqCst);
        }

        fn enter(&self) -> RpcResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_next.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_next.store(remaining - 1, Ordering::SeqCst);
                return Err(RpcError::NodeUnavailable("injected failure".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ChainSource for StubChain {
        async fn block_number(&self) -> RpcResult<u64> {
            self.enter()?;
            Ok(self.height.load(Ordering::SeqCst))
        }

        async fn block(&self, number: u64, full_transactions: bool) -> RpcResult<Option<BlockData>> {
            self.enter()?;
            Ok(self.blocks.lock().unwrap().get(&number).cloned().map(|mut b| {
                if !full_transactions {
                    b.transactions.clear();
                }
                b
            }))
        }

        async fn transaction_receipt(&self, hash: TxHash) -> RpcResult<Option<ReceiptData>> {
            self.enter()?;
            Ok(self.receipts.lock().unwrap().get(&hash).cloned())
        }

        async fn chain_id(&self) -> RpcResult<u64> {
            self.enter()?;
            Ok(56)
        }
    }
}

//! Chain access layer.
//!
//! # Data Flow
//! ```text
//! Monitor loop / confirmation engine
//!     → manager.rs (height cache, call budget, retries, health)
//!     → budget.rs (per-second and per-day windows)
//!     → source.rs (ChainSource trait)
//!     → client.rs (alloy HTTP providers, timeouts, failover)
//! ```
//!
//! # Constraints
//! - Every node call costs one budget unit and has a bounded wait
//! - Only the block height is cached; blocks and receipts are fetched fresh
//! - Graceful degradation when the node is unreachable

pub mod budget;
pub mod client;
pub mod manager;
pub mod source;
pub mod types;

pub use budget::{BudgetUsage, CallBudget};
pub use client::AlloySource;
pub use manager::{ConnectionInfo, RpcHealth, RpcManager, RpcSettings};
pub use source::ChainSource;
pub use types::{BlockData, ChainId, ReceiptData, RpcError, RpcResult, TxData};

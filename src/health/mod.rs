//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Node calls (blockchain::manager):
//!     success / transport failure
//!     → state.rs (consecutive counters, hysteresis)
//!     → RpcHealth snapshot
//!
//! Monitor::health():
//!     RpcHealth + pending set + loop state
//!     → MonitorHealth (overall verdict)
//! ```

pub mod state;

use serde::Serialize;

use crate::blockchain::manager::RpcHealth;

pub use state::{HealthState, HealthTracker};

/// Overall health of one running monitor.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorHealth {
    /// Running, node healthy, pending set within limits.
    pub healthy: bool,
    pub running: bool,
    pub chain: String,
    pub rpc: RpcHealth,
    pub pending_count: usize,
    pub oldest_pending_age_secs: Option<u64>,
    pub last_processed_block: Option<u64>,
    pub blocks_processed: u64,
    pub last_error: Option<String>,
}

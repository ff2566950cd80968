//! Transfer monitoring engine.
//!
//! # Data Flow
//! ```text
//! orchestrator.rs (scan loop, one tick at a time)
//!     → blockchain::RpcManager (height, blocks)
//!     → processor.rs (native + erc20.rs decode, policy.rs acceptance)
//!     → confirmation.rs (track, check_all: depth, hash, receipt, timeout)
//!     → notifier.rs (log, channel or webhook; redelivered on failure)
//!
//! feed.rs (JSON lines) → bounded queue → drained between ticks → policy.rs
//! ```
//!
//! # Design Decisions
//! - A tick reads one policy snapshot; updates publish a new one
//! - Only the loop task touches the pending set
//! - Chain failures pause block advancement, never the process

pub mod confirmation;
pub mod erc20;
pub mod feed;
pub mod notifier;
pub mod orchestrator;
pub mod policy;
pub mod processor;
pub mod types;

pub use confirmation::ConfirmationEngine;
pub use feed::{pump_lines, FeedError, WatchAction, WatchUpdate};
pub use notifier::{ChannelNotifier, LogNotifier, Notifier, NotifyError, WebhookNotifier};
pub use orchestrator::{Monitor, MonitorError, MonitorSettings};
pub use policy::{parse_watch_address, MonitorPolicy, PolicyStore, Strategy, WatchAddressError, WatchOutcome};
pub use processor::TransactionProcessor;
pub use types::{ConfirmationStatus, MatchReason, PendingConfirmation, TerminalEvent, TransactionInfo};

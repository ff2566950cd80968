//! Watch-list update feed.
//!
//! Payloads are JSON objects:
//! `{"address": "0x…", "action": "add" | "remove", "timestamp": …, "priority": …, "source": "…"}`.
//! Only `address` is required. A payload is validated as a whole before it
//! reaches the queue; nothing is applied partially.

use std::sync::Arc;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::lifecycle::ShutdownSignal;
use crate::monitor::policy::{parse_watch_address, WatchAddressError};
use crate::observability::stats::PerformanceMetrics;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] WatchAddressError),
    #[error("feed read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchAction {
    #[default]
    Add,
    Remove,
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    address: String,
    #[serde(default)]
    action: WatchAction,
    #[serde(default)]
    timestamp: Option<serde_json::Value>,
    #[serde(default)]
    priority: Option<serde_json::Value>,
    #[serde(default)]
    source: Option<String>,
}

/// A validated watch-list change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchUpdate {
    pub address: Address,
    pub action: WatchAction,
    /// Carried through for logging only.
    pub timestamp: Option<serde_json::Value>,
    pub priority: Option<serde_json::Value>,
    pub source: Option<String>,
}

impl WatchUpdate {
    pub fn add(address: Address) -> Self {
        Self {
            address,
            action: WatchAction::Add,
            timestamp: None,
            priority: None,
            source: None,
        }
    }

    pub fn remove(address: Address) -> Self {
        Self {
            action: WatchAction::Remove,
            ..Self::add(address)
        }
    }

    /// Parse and validate one payload.
    pub fn from_json(payload: &str) -> Result<Self, FeedError> {
        let raw: RawUpdate = serde_json::from_str(payload)?;
        Ok(Self {
            address: parse_watch_address(&raw.address)?,
            action: raw.action,
            timestamp: raw.timestamp,
            priority: raw.priority,
            source: raw.source,
        })
    }
}

/// Read JSON lines from `reader` into `queue` until EOF, shutdown, or the
/// queue closes. Invalid lines are logged and counted, then skipped.
///
/// Returns the number of updates enqueued.
pub async fn pump_lines<R>(
    reader: R,
    queue: mpsc::Sender<WatchUpdate>,
    mut shutdown: ShutdownSignal,
    stats: Arc<PerformanceMetrics>,
) -> Result<u64, FeedError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    loop {
        let line = tokio::select! {
            _ = shutdown.recv() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::debug!(forwarded, "Watch feed reached end of input");
            break;
        };

        let payload = line.trim();
        if payload.is_empty() {
            continue;
        }

        match WatchUpdate::from_json(payload) {
            Ok(update) => {
                if queue.send(update).await.is_err() {
                    tracing::debug!("Watch update queue closed, stopping feed");
                    break;
                }
                forwarded += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rejected watch update");
                stats.record_watch_update(false, "invalid");
            }
        }
    }

    Ok(forwarded)
}

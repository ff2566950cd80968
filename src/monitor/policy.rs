//! Monitoring policy and its snapshot store.
//!
//! The policy is a plain value. Scans read an `Arc` snapshot taken at the
//! start of a tick; writers build a modified copy and publish it atomically,
//! so an update never lands halfway through a scan.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, U256};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::units::to_raw_units;
use crate::config::schema::PolicyConfig;
use crate::monitor::types::MatchReason;

/// Fallback key in the high-value threshold table.
pub const DEFAULT_HIGH_VALUE_KEY: &str = "default";

/// Active monitoring strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Accept transfers at or above a per-symbol minimum.
    #[default]
    AmountThreshold,
    /// Accept transfers touching a watched address, regardless of amount.
    WatchAddress,
}

/// Why a watch-list address was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchAddressError {
    #[error("address must start with 0x")]
    MissingPrefix,
    #[error("address must have 40 hex digits, got {0}")]
    WrongLength(usize),
    #[error("address contains non-hex characters")]
    NotHex,
}

/// Validate a `0x`-prefixed, 40-hex-digit address. Case is ignored.
pub fn parse_watch_address(raw: &str) -> Result<Address, WatchAddressError> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or(WatchAddressError::MissingPrefix)?;

    if hex.len() != 40 {
        return Err(WatchAddressError::WrongLength(hex.len()));
    }
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(WatchAddressError::NotHex);
    }

    hex.to_ascii_lowercase()
        .parse::<Address>()
        .map_err(|_| WatchAddressError::NotHex)
}

/// Result of applying one watch-list change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchOutcome {
    Added,
    Duplicate,
    Removed,
    NotWatched,
    Invalid,
}

impl WatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchOutcome::Added => "added",
            WatchOutcome::Duplicate => "duplicate",
            WatchOutcome::Removed => "removed",
            WatchOutcome::NotWatched => "not_watched",
            WatchOutcome::Invalid => "invalid",
        }
    }

    /// True when the watch set changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, WatchOutcome::Added | WatchOutcome::Removed)
    }
}

/// What a scan consults to accept or reject a transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorPolicy {
    strategy: Strategy,
    thresholds: BTreeMap<String, f64>,
    high_value_thresholds: BTreeMap<String, f64>,
    high_value_bonus: u64,
    watch_addresses: BTreeSet<Address>,
}

impl MonitorPolicy {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            thresholds: BTreeMap::new(),
            high_value_thresholds: BTreeMap::new(),
            high_value_bonus: 0,
            watch_addresses: BTreeSet::new(),
        }
    }

    /// Build from the `[policy]` section. Fails on the first invalid address.
    pub fn from_config(config: &PolicyConfig) -> Result<Self, WatchAddressError> {
        let watch_addresses = config
            .watch_addresses
            .iter()
            .map(|a| parse_watch_address(a))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            strategy: config.strategy,
            thresholds: config.thresholds.clone(),
            high_value_thresholds: config.high_value_thresholds.clone(),
            high_value_bonus: config.high_value_extra_confirmations,
            watch_addresses,
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    pub fn threshold(&self, symbol: &str) -> Option<f64> {
        self.thresholds.get(symbol).copied()
    }

    pub fn thresholds(&self) -> &BTreeMap<String, f64> {
        &self.thresholds
    }

    /// Merge new minimums into the table, replacing existing symbols.
    pub fn update_thresholds(&mut self, updates: impl IntoIterator<Item = (String, f64)>) {
        self.thresholds.extend(updates);
    }

    /// High-value threshold for `symbol`, falling back to the `default` entry.
    pub fn high_value_threshold(&self, symbol: &str) -> Option<f64> {
        self.high_value_thresholds
            .get(symbol)
            .or_else(|| self.high_value_thresholds.get(DEFAULT_HIGH_VALUE_KEY))
            .copied()
    }

    pub fn update_high_value_thresholds(&mut self, updates: impl IntoIterator<Item = (String, f64)>) {
        self.high_value_thresholds.extend(updates);
    }

    /// Confirmations added for high-value candidates.
    pub fn high_value_bonus(&self) -> u64 {
        self.high_value_bonus
    }

    pub fn set_high_value_bonus(&mut self, bonus: u64) {
        self.high_value_bonus = bonus;
    }

    pub fn watch_addresses(&self) -> &BTreeSet<Address> {
        &self.watch_addresses
    }

    pub fn is_watched(&self, address: &Address) -> bool {
        self.watch_addresses.contains(address)
    }

    /// Returns false when already present.
    pub fn add_watch_address(&mut self, address: Address) -> bool {
        self.watch_addresses.insert(address)
    }

    /// Returns false when not present.
    pub fn remove_watch_address(&mut self, address: &Address) -> bool {
        self.watch_addresses.remove(address)
    }

    /// Swap in a whole new watch set, returning the previous one.
    pub fn replace_watch_addresses(&mut self, addresses: BTreeSet<Address>) -> BTreeSet<Address> {
        std::mem::replace(&mut self.watch_addresses, addresses)
    }

    /// Acceptance test for a transfer, dispatched on the active strategy.
    pub fn evaluate(&self, symbol: &str, raw_amount: U256, decimals: u8, from: &Address, to: &Address) -> Option<MatchReason> {
        match self.strategy {
            Strategy::AmountThreshold => self.accept_by_amount(symbol, raw_amount, decimals),
            Strategy::WatchAddress => self.accept_by_address(from, to),
        }
    }

    /// A symbol without a configured minimum is never accepted.
    fn accept_by_amount(&self, symbol: &str, raw_amount: U256, decimals: u8) -> Option<MatchReason> {
        let minimum = to_raw_units(self.threshold(symbol)?, decimals);
        (raw_amount >= minimum).then_some(MatchReason::AmountThreshold)
    }

    fn accept_by_address(&self, from: &Address, to: &Address) -> Option<MatchReason> {
        if self.is_watched(to) {
            Some(MatchReason::WatchedRecipient)
        } else if self.is_watched(from) {
            Some(MatchReason::WatchedSender)
        } else {
            None
        }
    }

    /// Inclusive comparison against the high-value threshold.
    pub fn is_high_value(&self, symbol: &str, raw_amount: U256, decimals: u8) -> bool {
        self.high_value_threshold(symbol)
            .map(|t| raw_amount >= to_raw_units(t, decimals))
            .unwrap_or(false)
    }
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self::new(Strategy::default())
    }
}

/// Lock-free snapshots for readers, serialized copy-on-write for writers.
pub struct PolicyStore {
    current: ArcSwap<MonitorPolicy>,
    writer: Mutex<()>,
}

impl PolicyStore {
    pub fn new(policy: MonitorPolicy) -> Self {
        Self {
            current: ArcSwap::from_pointee(policy),
            writer: Mutex::new(()),
        }
    }

    /// A consistent view that stays valid for as long as it is held.
    pub fn snapshot(&self) -> Arc<MonitorPolicy> {
        self.current.load_full()
    }

    /// Apply `f` to a copy of the current policy and publish it.
    pub fn update<R>(&self, f: impl FnOnce(&mut MonitorPolicy) -> R) -> R {
        let _guard = self.writer.lock().expect("policy writer mutex poisoned");
        let mut next = MonitorPolicy::clone(&self.current.load());
        let result = f(&mut next);
        self.current.store(Arc::new(next));
        result
    }
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PolicyStore").field(&self.current.load()).finish()
    }
}

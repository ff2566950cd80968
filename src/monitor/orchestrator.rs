//! The scan loop and its control handle.
//!
//! # Tick
//! ```text
//! height ─┬─ ok ──→ blocks [next, min(height, next + max - 1)]
//!         │           → classify (one policy snapshot) → track
//!         │         → check_all → deliver → drain watch updates
//!         └─ err ─→ sweep_timeouts → deliver → drain watch updates → back off
//! ```
//!
//! A block fetch failure stops the range at that block; the next tick starts
//! from the same block after a backoff.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::Address;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::blockchain::manager::{RpcManager, RpcSettings};
use crate::blockchain::source::ChainSource;
use crate::blockchain::types::RpcError;
use crate::chain::profile::{ChainProfile, ProfileError};
use crate::config::schema::{MonitorConfig, PolicyConfig};
use crate::health::MonitorHealth;
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::monitor::confirmation::ConfirmationEngine;
use crate::monitor::feed::{WatchAction, WatchUpdate};
use crate::monitor::notifier::Notifier;
use crate::monitor::policy::{parse_watch_address, MonitorPolicy, PolicyStore, Strategy, WatchAddressError, WatchOutcome};
use crate::monitor::processor::TransactionProcessor;
use crate::monitor::types::{unix_now, TerminalEvent};
use crate::observability::metrics;
use crate::observability::stats::{PerformanceMetrics, StatsSnapshot};
use crate::resilience::backoff::backoff_delay;

/// Events kept for redelivery while the notifier is failing.
const REDELIVERY_CAPACITY: usize = 1024;

/// Upper bound on the pause after consecutive failed ticks.
const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("chain profile: {0}")]
    Profile(#[from] ProfileError),
    #[error("watch address: {0}")]
    WatchAddress(#[from] WatchAddressError),
    #[error("threshold for {symbol} must be finite and non-negative, got {value}")]
    InvalidThreshold { symbol: String, value: f64 },
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Loop tuning.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub scan_interval: Duration,
    pub transaction_timeout: Duration,
    pub max_blocks_per_tick: u64,
    /// First block to scan; the head at first tick when unset.
    pub start_block: Option<u64>,
    pub update_queue_capacity: usize,
    /// Zero disables the periodic summary.
    pub stats_log_interval: Duration,
    pub max_pending: usize,
    pub max_pending_age: Duration,
    pub rpc: RpcSettings,
}

impl MonitorSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        let scanner = &config.scanner;
        Self {
            scan_interval: Duration::from_millis(scanner.scan_interval_ms),
            transaction_timeout: Duration::from_secs(scanner.transaction_timeout_secs),
            max_blocks_per_tick: scanner.max_blocks_per_tick.max(1),
            start_block: scanner.start_block,
            update_queue_capacity: scanner.update_queue_capacity.max(1),
            stats_log_interval: Duration::from_secs(scanner.stats_log_interval_secs),
            max_pending: config.health.max_pending,
            max_pending_age: Duration::from_secs(config.health.max_pending_age_secs),
            rpc: RpcSettings::from_config(config),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

/// Loop state published after every tick, read by `health()`.
#[derive(Debug, Clone, Default)]
struct Published {
    pending_count: usize,
    oldest_first_seen: Option<u64>,
    last_processed_block: Option<u64>,
    last_error: Option<String>,
}

/// State shared by the handle and the running loop.
struct Shared {
    profile: Arc<ChainProfile>,
    rpc: Arc<RpcManager>,
    policy: PolicyStore,
    stats: Arc<PerformanceMetrics>,
    running: AtomicBool,
    published: Mutex<Published>,
}

impl Shared {
    fn apply_update(&self, update: &WatchUpdate) -> WatchOutcome {
        let outcome = match update.action {
            WatchAction::Add => {
                if self.policy.update(|p| p.add_watch_address(update.address)) {
                    WatchOutcome::Added
                } else {
                    WatchOutcome::Duplicate
                }
            }
            WatchAction::Remove => {
                if self.policy.update(|p| p.remove_watch_address(&update.address)) {
                    WatchOutcome::Removed
                } else {
                    WatchOutcome::NotWatched
                }
            }
        };
        self.record_watch_outcome(&update.address.to_string(), outcome, update.source.as_deref());
        outcome
    }

    fn record_watch_outcome(&self, address: &str, outcome: WatchOutcome, source: Option<&str>) {
        self.stats.record_watch_update(outcome.is_applied(), outcome.as_str());
        match outcome {
            WatchOutcome::Invalid => tracing::warn!(address, "Rejected invalid watch address"),
            _ => tracing::info!(address, outcome = outcome.as_str(), source, "Watch list update"),
        }
    }
}

/// Everything the loop owns between runs.
struct ScanLoop {
    shared: Arc<Shared>,
    settings: MonitorSettings,
    processor: TransactionProcessor,
    engine: ConfirmationEngine,
    notifier: Arc<dyn Notifier>,
    updates: mpsc::Receiver<WatchUpdate>,
    redelivery: VecDeque<TerminalEvent>,
    next_block: Option<u64>,
    last_processed: Option<u64>,
    consecutive_errors: u32,
    last_stats_log: Instant,
}

impl ScanLoop {
    async fn run(mut self, mut shutdown: ShutdownSignal) -> Self {
        tracing::info!(
            chain = self.shared.profile.name(),
            next_block = self.next_block,
            pending = self.engine.pending_count(),
            "Scan loop started"
        );

        while !shutdown.is_triggered() {
            let delay = match self.tick(&shutdown).await {
                Ok(()) => {
                    self.consecutive_errors = 0;
                    self.settings.scan_interval
                }
                Err(e) => {
                    self.consecutive_errors = self.consecutive_errors.saturating_add(1);
                    let delay = backoff_delay(
                        self.consecutive_errors,
                        self.settings.scan_interval,
                        MAX_ERROR_BACKOFF.max(self.settings.scan_interval),
                    );
                    tracing::warn!(
                        error = %e,
                        consecutive_errors = self.consecutive_errors,
                        retry_in_ms = delay.as_millis() as u64,
                        next_block = self.next_block,
                        "Scan tick failed"
                    );
                    delay
                }
            };
            self.maybe_log_stats();

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(
            chain = self.shared.profile.name(),
            next_block = self.next_block,
            pending = self.engine.pending_count(),
            "Scan loop stopped"
        );
        self
    }

    async fn tick(&mut self, shutdown: &ShutdownSignal) -> Result<(), RpcError> {
        let now = unix_now();
        let rpc = self.shared.rpc.clone();

        let height = match rpc.current_block_height().await {
            Ok(height) => height,
            Err(e) => {
                let events = self.engine.sweep_timeouts(now);
                self.finish_tick(events, now, Some(&e)).await;
                return Err(e);
            }
        };

        let policy = self.shared.policy.snapshot();
        let start = *self.next_block.get_or_insert(self.settings.start_block.unwrap_or(height));
        let end = height.min(start.saturating_add(self.settings.max_blocks_per_tick - 1));
        let mut fetch_error = None;

        for number in start..=end {
            if shutdown.is_triggered() {
                break;
            }
            let block = match rpc.get_block(number, true).await {
                Ok(block) => block,
                Err(e) => {
                    fetch_error = Some(e);
                    break;
                }
            };

            let found = self.processor.scan_block(&block, &policy, now);
            for info in found {
                let required = self.processor.required_confirmations(&info, &policy);
                self.engine.track(info, required, now);
            }

            tracing::debug!(block = number, txs = block.transactions.len(), head = height, "Block processed");
            self.shared.stats.record_block_processed(number);
            self.next_block = Some(number + 1);
            self.last_processed = Some(number);
        }

        let events = self.engine.check_all(&rpc, height, now).await;
        self.finish_tick(events, now, fetch_error.as_ref()).await;

        match fetch_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn finish_tick(&mut self, events: Vec<TerminalEvent>, now: u64, error: Option<&RpcError>) {
        for event in &events {
            self.shared.stats.record_terminal(event.status);
        }
        self.deliver(events).await;
        self.drain_updates();
        self.publish(now, error);
    }

    /// Hand events to the notifier, oldest undelivered first. Failures are
    /// kept for the next tick.
    async fn deliver(&mut self, events: Vec<TerminalEvent>) {
        let mut queue = std::mem::take(&mut self.redelivery);
        queue.extend(events);

        for event in queue {
            if let Err(e) = self.notifier.notify(&event).await {
                tracing::warn!(tx = %event.transaction.hash, status = %event.status, error = %e, "Notification failed, will retry");
                self.shared.stats.record_notify_failure();
                if self.redelivery.len() >= REDELIVERY_CAPACITY {
                    if let Some(dropped) = self.redelivery.pop_front() {
                        tracing::error!(tx = %dropped.transaction.hash, "Redelivery buffer full, dropping event");
                    }
                }
                self.redelivery.push_back(event);
            }
        }
    }

    fn drain_updates(&mut self) {
        while let Ok(update) = self.updates.try_recv() {
            self.shared.apply_update(&update);
        }
    }

    fn publish(&self, now: u64, error: Option<&RpcError>) {
        let pending_count = self.engine.pending_count();
        metrics::record_pending(pending_count);

        let mut published = self.shared.published.lock().expect("published state mutex poisoned");
        published.pending_count = pending_count;
        published.oldest_first_seen = self.engine.oldest_first_seen();
        published.last_processed_block = self.last_processed;
        published.last_error = error.map(|e| e.to_string());
        tracing::trace!(now, pending_count, "Published loop state");
    }

    fn maybe_log_stats(&mut self) {
        let interval = self.settings.stats_log_interval;
        if interval.is_zero() || self.last_stats_log.elapsed() < interval {
            return;
        }
        self.last_stats_log = Instant::now();
        self.shared.stats.log_summary(self.shared.profile.name());
        let by_symbol = self.engine.pending_by_symbol();
        if !by_symbol.is_empty() {
            tracing::info!(
                pending = ?by_symbol,
                by_block = ?self.engine.pending_by_block(),
                "Pending confirmations"
            );
        }
    }
}

enum LoopSlot {
    Idle(Box<ScanLoop>),
    Running { shutdown: Shutdown, handle: JoinHandle<ScanLoop> },
    Lost,
}

/// One monitored chain: a control handle over the scan loop.
pub struct Monitor {
    shared: Arc<Shared>,
    settings: MonitorSettings,
    notifier: Arc<dyn Notifier>,
    updates_tx: Mutex<mpsc::Sender<WatchUpdate>>,
    slot: tokio::sync::Mutex<LoopSlot>,
}

impl Monitor {
    pub fn new(
        profile: ChainProfile,
        source: Arc<dyn ChainSource>,
        policy: MonitorPolicy,
        notifier: Arc<dyn Notifier>,
        mut settings: MonitorSettings,
    ) -> Self {
        settings.max_blocks_per_tick = settings.max_blocks_per_tick.max(1);
        settings.update_queue_capacity = settings.update_queue_capacity.max(1);

        let stats = Arc::new(PerformanceMetrics::new());
        let shared = Arc::new(Shared {
            profile: Arc::new(profile),
            rpc: Arc::new(RpcManager::new(source, settings.rpc.clone(), stats.clone())),
            policy: PolicyStore::new(policy),
            stats,
            running: AtomicBool::new(false),
            published: Mutex::new(Published::default()),
        });

        let (updates_tx, updates_rx) = mpsc::channel(settings.update_queue_capacity);
        let scan = ScanLoop::new(shared.clone(), settings.clone(), notifier.clone(), updates_rx);

        Self {
            shared,
            settings,
            notifier,
            updates_tx: Mutex::new(updates_tx),
            slot: tokio::sync::Mutex::new(LoopSlot::Idle(Box::new(scan))),
        }
    }

    /// Build the profile, policy and settings from a validated config.
    pub fn from_config(
        config: &MonitorConfig,
        source: Arc<dyn ChainSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, MonitorError> {
        let profile = ChainProfile::from_config(&config.chain)?;
        let policy = MonitorPolicy::from_config(&config.policy)?;
        Ok(Self::new(profile, source, policy, notifier, MonitorSettings::from_config(config)))
    }

    /// Spawn the scan loop. Returns false when it was already running.
    pub async fn start(&self) -> bool {
        let mut slot = self.slot.lock().await;
        let scan = match std::mem::replace(&mut *slot, LoopSlot::Lost) {
            LoopSlot::Idle(scan) => scan,
            LoopSlot::Lost => Box::new(self.rebuild_loop()),
            running @ LoopSlot::Running { .. } => {
                *slot = running;
                return false;
            }
        };

        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();
        let handle = tokio::spawn((*scan).run(signal));
        self.shared.running.store(true, Ordering::SeqCst);
        *slot = LoopSlot::Running { shutdown, handle };
        true
    }

    /// Stop after the in-flight tick. Returns false when already stopped.
    pub async fn stop(&self) -> bool {
        let mut slot = self.slot.lock().await;
        let (shutdown, handle) = match std::mem::replace(&mut *slot, LoopSlot::Lost) {
            LoopSlot::Running { shutdown, handle } => (shutdown, handle),
            idle => {
                *slot = idle;
                return false;
            }
        };

        shutdown.trigger();
        match handle.await {
            Ok(scan) => *slot = LoopSlot::Idle(Box::new(scan)),
            Err(e) => {
                tracing::error!(error = %e, "Scan loop task failed, pending set lost");
                *slot = LoopSlot::Lost;
            }
        }
        self.shared.running.store(false, Ordering::SeqCst);
        true
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Merge per-symbol minimums. Nothing is applied if any value is invalid.
    pub fn update_thresholds(&self, thresholds: impl IntoIterator<Item = (String, f64)>) -> Result<(), MonitorError> {
        let thresholds = checked_thresholds(thresholds)?;
        tracing::info!(?thresholds, "Updating thresholds");
        self.shared.policy.update(|p| p.update_thresholds(thresholds));
        Ok(())
    }

    /// Merge high-value thresholds and optionally replace the bonus.
    pub fn update_high_value(
        &self,
        thresholds: impl IntoIterator<Item = (String, f64)>,
        bonus: Option<u64>,
    ) -> Result<(), MonitorError> {
        let thresholds = checked_thresholds(thresholds)?;
        tracing::info!(?thresholds, bonus, "Updating high-value policy");
        self.shared.policy.update(|p| {
            p.update_high_value_thresholds(thresholds);
            if let Some(bonus) = bonus {
                p.set_high_value_bonus(bonus);
            }
        });
        Ok(())
    }

    pub fn set_strategy(&self, strategy: Strategy) {
        tracing::info!(?strategy, "Switching strategy");
        self.shared.policy.update(|p| p.set_strategy(strategy));
    }

    /// Returns false when already watched.
    pub fn add_watch_address(&self, address: Address) -> bool {
        self.shared.apply_update(&WatchUpdate::add(address)) == WatchOutcome::Added
    }

    /// Returns false when not watched.
    pub fn remove_watch_address(&self, address: Address) -> bool {
        self.shared.apply_update(&WatchUpdate::remove(address)) == WatchOutcome::Removed
    }

    /// Validate and add one raw address.
    pub fn apply_watch_update(&self, address: &str) -> WatchOutcome {
        match parse_watch_address(address) {
            Ok(parsed) => self.shared.apply_update(&WatchUpdate::add(parsed)),
            Err(_) => {
                self.shared.record_watch_outcome(address, WatchOutcome::Invalid, None);
                WatchOutcome::Invalid
            }
        }
    }

    /// Replace the whole watch set. Nothing changes if any address is invalid.
    pub fn update_watch_addresses<'a>(&self, addresses: impl IntoIterator<Item = &'a str>) -> Result<usize, MonitorError> {
        let parsed = addresses
            .into_iter()
            .map(parse_watch_address)
            .collect::<Result<std::collections::BTreeSet<_>, _>>()?;
        let count = parsed.len();
        let previous = self.shared.policy.update(|p| p.replace_watch_addresses(parsed));
        tracing::info!(count, previous = previous.len(), "Watch list replaced");
        Ok(count)
    }

    /// Apply a validated feed update immediately instead of queueing it.
    pub fn apply_update(&self, update: &WatchUpdate) -> WatchOutcome {
        self.shared.apply_update(update)
    }

    /// Apply a reloaded `[policy]` section. Thresholds merge and addresses are
    /// only added.
    pub fn reload_policy(&self, config: &PolicyConfig) -> Result<(), MonitorError> {
        let incoming = MonitorPolicy::from_config(config)?;
        let thresholds = checked_thresholds(config.thresholds.clone())?;
        let high_value = checked_thresholds(config.high_value_thresholds.clone())?;

        self.shared.policy.update(|p| {
            p.set_strategy(incoming.strategy());
            p.update_thresholds(thresholds);
            p.update_high_value_thresholds(high_value);
            p.set_high_value_bonus(incoming.high_value_bonus());
            for address in incoming.watch_addresses() {
                p.add_watch_address(*address);
            }
        });
        tracing::info!(strategy = ?incoming.strategy(), "Policy reloaded");
        Ok(())
    }

    /// Consistent view of the current policy.
    pub fn policy(&self) -> Arc<MonitorPolicy> {
        self.shared.policy.snapshot()
    }

    /// Producer side of the bounded watch-update queue, drained between ticks.
    pub fn feed_sender(&self) -> mpsc::Sender<WatchUpdate> {
        self.updates_tx.lock().expect("update sender mutex poisoned").clone()
    }

    pub fn profile(&self) -> &ChainProfile {
        &self.shared.profile
    }

    pub fn rpc(&self) -> Arc<RpcManager> {
        self.shared.rpc.clone()
    }

    pub fn metrics(&self) -> Arc<PerformanceMetrics> {
        self.shared.stats.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.shared.stats.reset();
    }

    pub fn health(&self) -> MonitorHealth {
        let published = self.shared.published.lock().expect("published state mutex poisoned").clone();
        let rpc = self.shared.rpc.health();
        let running = self.is_running();
        let oldest_pending_age_secs = published
            .oldest_first_seen
            .map(|first_seen| unix_now().saturating_sub(first_seen));

        let healthy = running
            && rpc.healthy
            && published.pending_count < self.settings.max_pending
            && oldest_pending_age_secs.map_or(true, |age| age < self.settings.max_pending_age.as_secs());

        MonitorHealth {
            healthy,
            running,
            chain: self.shared.profile.name().to_string(),
            rpc,
            pending_count: published.pending_count,
            oldest_pending_age_secs,
            last_processed_block: published.last_processed_block,
            blocks_processed: self.shared.stats.snapshot().blocks_processed,
            last_error: published.last_error,
        }
    }

    /// Fresh loop after the previous one was lost to a panic.
    fn rebuild_loop(&self) -> ScanLoop {
        let (updates_tx, updates_rx) = mpsc::channel(self.settings.update_queue_capacity);
        *self.updates_tx.lock().expect("update sender mutex poisoned") = updates_tx;
        ScanLoop::new(self.shared.clone(), self.settings.clone(), self.notifier.clone(), updates_rx)
    }
}

impl ScanLoop {
    fn new(
        shared: Arc<Shared>,
        settings: MonitorSettings,
        notifier: Arc<dyn Notifier>,
        updates: mpsc::Receiver<WatchUpdate>,
    ) -> Self {
        Self {
            processor: TransactionProcessor::new(shared.profile.clone(), shared.stats.clone()),
            engine: ConfirmationEngine::new(settings.transaction_timeout),
            shared,
            settings,
            notifier,
            updates,
            redelivery: VecDeque::new(),
            next_block: None,
            last_processed: None,
            consecutive_errors: 0,
            last_stats_log: Instant::now(),
        }
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("chain", &self.shared.profile.name())
            .field("running", &self.is_running())
            .field("settings", &self.settings)
            .finish()
    }
}

fn checked_thresholds(
    thresholds: impl IntoIterator<Item = (String, f64)>,
) -> Result<Vec<(String, f64)>, MonitorError> {
    thresholds
        .into_iter()
        .map(|(symbol, value)| {
            if value.is_finite() && value >= 0.0 {
                Ok((symbol, value))
            } else {
                Err(MonitorError::InvalidThreshold { symbol, value })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::source::testing::StubChain;
    use crate::blockchain::types::BlockData;
    use crate::monitor::notifier::ChannelNotifier;
    use alloy::primitives::B256;

    fn monitor(chain: Arc<StubChain>) -> Monitor {
        let mut settings = MonitorSettings::default();
        settings.scan_interval = Duration::from_millis(100);
        settings.stats_log_interval = Duration::ZERO;
        let (notifier, _rx) = ChannelNotifier::new(16);
        Monitor::new(
            ChainProfile::new("bsc", "BNB", 12),
            chain,
            MonitorPolicy::default(),
            Arc::new(notifier),
            settings,
        )
    }

    fn empty_block(number: u64) -> BlockData {
        BlockData {
            number,
            hash: B256::with_last_byte(number as u8),
            parent_hash: B256::ZERO,
            timestamp: 0,
            transactions: Vec::new(),
        }
    }

    #[test]
    fn test_threshold_updates_validated_atomically() {
        let monitor = monitor(Arc::new(StubChain::default()));
        let err = monitor
            .update_thresholds([("USDT".to_string(), 5.0), ("ETH".to_string(), f64::NAN)])
            .unwrap_err();
        assert!(matches!(err, MonitorError::InvalidThreshold { .. }));
        assert_eq!(monitor.policy().threshold("USDT"), None);

        monitor.update_thresholds([("USDT".to_string(), 5.0)]).unwrap();
        assert_eq!(monitor.policy().threshold("USDT"), Some(5.0));
    }

    #[test]
    fn test_watch_updates() {
        let monitor = monitor(Arc::new(StubChain::default()));
        let address = "0x00000000000000000000000000000000000000aa";

        assert_eq!(monitor.apply_watch_update(address), WatchOutcome::Added);
        assert_eq!(monitor.apply_watch_update(&address.to_uppercase().replacen("0X", "0x", 1)), WatchOutcome::Duplicate);
        assert_eq!(monitor.apply_watch_update("0x12"), WatchOutcome::Invalid);
        assert_eq!(monitor.policy().watch_addresses().len(), 1);

        assert!(monitor.remove_watch_address(Address::with_last_byte(0xaa)));
        assert!(!monitor.remove_watch_address(Address::with_last_byte(0xaa)));

        let stats = monitor.stats();
        assert_eq!(stats.watch_updates_applied, 2);
        assert_eq!(stats.watch_updates_rejected, 3);
    }

    #[test]
    fn test_bulk_watch_replacement() {
        let monitor = monitor(Arc::new(StubChain::default()));
        monitor.add_watch_address(Address::with_last_byte(1));

        let err = monitor
            .update_watch_addresses(["0x00000000000000000000000000000000000000aa", "0xbad"])
            .unwrap_err();
        assert!(matches!(err, MonitorError::WatchAddress(_)));
        assert!(monitor.policy().is_watched(&Address::with_last_byte(1)));

        let count = monitor
            .update_watch_addresses([
                "0x00000000000000000000000000000000000000aa",
                "0x00000000000000000000000000000000000000AA",
                "0x00000000000000000000000000000000000000bb",
            ])
            .unwrap();
        assert_eq!(count, 2);
        let policy = monitor.policy();
        assert!(!policy.is_watched(&Address::with_last_byte(1)));
        assert!(policy.is_watched(&Address::with_last_byte(0xaa)));
        assert!(policy.is_watched(&Address::with_last_byte(0xbb)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_idempotent_and_resumable() {
        let chain = Arc::new(StubChain::default());
        for n in 10..=12 {
            chain.insert_block(empty_block(n));
        }
        chain.set_height(10);
        let monitor = monitor(chain.clone());

        assert!(!monitor.stop().await);
        assert!(monitor.start().await);
        assert!(!monitor.start().await);
        assert!(monitor.is_running());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(monitor.stop().await);
        assert!(!monitor.stop().await);
        assert!(!monitor.is_running());
        assert_eq!(monitor.health().last_processed_block, Some(10));

        chain.set_height(12);
        assert!(monitor.start().await);
        tokio::time::sleep(Duration::from_secs(3)).await;
        monitor.stop().await;

        let health = monitor.health();
        assert_eq!(health.last_processed_block, Some(12));
        assert_eq!(health.blocks_processed, 3);
        assert!(!health.healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_sized_settings_are_clamped() {
        let chain = Arc::new(StubChain::default());
        for n in 5..=6 {
            chain.insert_block(empty_block(n));
        }
        chain.set_height(6);
        let mut settings = MonitorSettings::default();
        settings.scan_interval = Duration::from_millis(100);
        settings.stats_log_interval = Duration::ZERO;
        settings.start_block = Some(5);
        settings.max_blocks_per_tick = 0;
        settings.update_queue_capacity = 0;
        let (notifier, _rx) = ChannelNotifier::new(16);
        let monitor = Monitor::new(
            ChainProfile::new("bsc", "BNB", 12),
            chain,
            MonitorPolicy::default(),
            Arc::new(notifier),
            settings,
        );

        monitor.feed_sender().try_send(WatchUpdate::add(Address::with_last_byte(7))).unwrap();
        monitor.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(monitor.health().last_processed_block, Some(5));

        tokio::time::sleep(Duration::from_millis(100)).await;
        monitor.stop().await;
        assert_eq!(monitor.health().last_processed_block, Some(6));
        assert!(monitor.policy().is_watched(&Address::with_last_byte(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_error_cleared_after_clean_tick() {
        let chain = Arc::new(StubChain::default());
        chain.insert_block(empty_block(1));
        chain.set_height(1);
        chain.fail_times(1_000);
        let monitor = monitor(chain.clone());

        monitor.start().await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(monitor.health().last_error.is_some());

        chain.fail_times(0);
        tokio::time::sleep(Duration::from_secs(40)).await;
        monitor.stop().await;

        let health = monitor.health();
        assert_eq!(health.last_processed_block, Some(1));
        assert_eq!(health.last_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_updates_drained_by_loop() {
        let chain = Arc::new(StubChain::default());
        chain.insert_block(empty_block(1));
        chain.set_height(1);
        let monitor = monitor(chain);

        monitor
            .feed_sender()
            .send(WatchUpdate::add(Address::with_last_byte(1)))
            .await
            .unwrap();
        assert!(monitor.policy().watch_addresses().is_empty());

        monitor.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.stop().await;

        assert!(monitor.policy().is_watched(&Address::with_last_byte(1)));
    }
}

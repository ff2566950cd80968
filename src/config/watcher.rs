//! Policy hot reload.
//!
//! The watcher keeps the configuration the process started with. On every
//! change it reloads the file, warns about sections that only take effect on
//! restart, and forwards the `[policy]` section when it differs from the one
//! last applied.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{MonitorConfig, PolicyConfig};

/// Sections of `reloaded` that differ from `running`, in file order.
pub fn changed_sections(running: &MonitorConfig, reloaded: &MonitorConfig) -> Vec<&'static str> {
    let sections = [
        ("chain", running.chain != reloaded.chain),
        ("rpc", running.rpc != reloaded.rpc),
        ("retries", running.retries != reloaded.retries),
        ("policy", running.policy != reloaded.policy),
        ("scanner", running.scanner != reloaded.scanner),
        ("health", running.health != reloaded.health),
        ("observability", running.observability != reloaded.observability),
        ("feed", running.feed != reloaded.feed),
        ("notifier", running.notifier != reloaded.notifier),
    ];
    sections
        .into_iter()
        .filter_map(|(name, changed)| changed.then_some(name))
        .collect()
}

/// Compare a reloaded config with the running one. Only the policy is adopted;
/// the other sections keep their startup values so every later reload warns
/// again until the process restarts.
pub fn reconcile(running: &mut MonitorConfig, reloaded: MonitorConfig) -> Option<PolicyConfig> {
    let changed = changed_sections(running, &reloaded);
    for section in changed.iter().filter(|s| **s != "policy") {
        tracing::warn!(section = *section, "Config section changed on disk, restart required to apply it");
    }

    if !changed.contains(&"policy") {
        tracing::debug!("Policy unchanged after reload");
        return None;
    }
    running.policy = reloaded.policy;
    Some(running.policy.clone())
}

/// Watches the configuration file and emits changed policies.
pub struct ConfigWatcher {
    path: PathBuf,
    running: MonitorConfig,
    policy_tx: mpsc::UnboundedSender<PolicyConfig>,
}

impl ConfigWatcher {
    /// `running` is the configuration the monitor was built from.
    pub fn new(path: &Path, running: MonitorConfig) -> (Self, mpsc::UnboundedReceiver<PolicyConfig>) {
        let (policy_tx, policy_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                running,
                policy_tx,
            },
            policy_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            mut running,
            policy_tx,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => match load_config(&path) {
                    Ok(reloaded) => {
                        if let Some(policy) = reconcile(&mut running, reloaded) {
                            tracing::info!(path = ?path, strategy = ?policy.strategy, "Policy change detected");
                            let _ = policy_tx.send(policy);
                        }
                    }
                    Err(e) => tracing::error!(path = ?path, error = %e, "Reload failed, keeping current policy"),
                },
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?watched, "Watching config for policy changes");
        Ok(watcher)
    }
}

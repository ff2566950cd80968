//! EVM transfer monitor.
//!
//! Watches one EVM chain for native and ERC-20 transfers that match the
//! configured policy and reports each one once it is final.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌───────────────────────────────────────────────────────────┐
//!                    │                     TRANSFER MONITOR                      │
//!                    │                                                           │
//!   Chain node       │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!  ◀─────────────────┼──│  blockchain  │◀──│   monitor    │──▶│ confirmation │   │
//!   (JSON-RPC)       │  │ budget/cache │   │ orchestrator │   │    engine    │   │
//!                    │  └──────────────┘   └──────┬───────┘   └──────┬───────┘   │
//!                    │                            │                  │           │
//!   Watch feed       │  ┌──────────────┐          ▼                  ▼           │
//!  ──────────────────┼─▶│  feed pump   │──▶ policy store       ┌──────────────┐   │   Terminal
//!   (JSON lines)     │  └──────────────┘   (ArcSwap snapshot)  │   notifier   │───┼──▶ events
//!                    │                                         └──────────────┘   │
//!                    │  ┌─────────────────────────────────────────────────────┐  │
//!                    │  │               Cross-Cutting Concerns                │  │
//!                    │  │  ┌────────┐ ┌────────┐ ┌────────────┐ ┌───────────┐ │  │
//!                    │  │  │ config │ │ health │ │observabil- │ │ lifecycle │ │  │
//!                    │  │  │+watcher│ │        │ │ity/metrics │ │ + signals │ │  │
//!                    │  │  └────────┘ └────────┘ └────────────┘ └───────────┘ │  │
//!                    │  └─────────────────────────────────────────────────────┘  │
//!                    └───────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::BufReader;

use evm_transfer_monitor::blockchain::AlloySource;
use evm_transfer_monitor::config::{load_config, watcher::ConfigWatcher};
use evm_transfer_monitor::lifecycle::{wait_for_signal, Shutdown};
use evm_transfer_monitor::monitor::{pump_lines, LogNotifier, Monitor, Notifier, WebhookNotifier};
use evm_transfer_monitor::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "evm-transfer-monitor", version, about = "Monitor an EVM chain for large or watched transfers")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/monitor.toml")]
    config: PathBuf,

    /// Reload the [policy] section when the file changes.
    #[arg(long)]
    watch_config: bool,

    /// Read watch-list updates as JSON lines from stdin.
    #[arg(long)]
    feed_stdin: bool,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", args.config.display(), e);
            std::process::exit(2);
        }
    };
    if args.check {
        println!("{}: ok", args.config.display());
        return Ok(());
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        chain = %config.chain.name,
        strategy = ?config.policy.strategy,
        "evm-transfer-monitor starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let urls: Vec<String> = std::iter::once(config.chain.rpc_url.clone())
        .chain(config.chain.failover_urls.iter().cloned())
        .collect();
    let source = Arc::new(AlloySource::new(&urls, Duration::from_secs(config.rpc.timeout_secs))?);
    let notifier: Arc<dyn Notifier> = match WebhookNotifier::from_config(&config.notifier)? {
        Some(webhook) => {
            tracing::info!(url = %webhook.url(), "Delivering terminal events to webhook");
            Arc::new(webhook)
        }
        None => Arc::new(LogNotifier),
    };
    let monitor = Arc::new(Monitor::from_config(&config, source, notifier)?);

    let rpc = monitor.rpc();
    match rpc.test_connection().await {
        Ok(info) => tracing::info!(height = info.height, chain_id = info.chain_id, "Connected to node"),
        Err(e) => tracing::warn!(error = %e, "Node not reachable yet, the scan loop will keep retrying"),
    }
    if let Some(expected) = monitor.profile().chain_id() {
        if let Err(e) = rpc.verify_chain_id(expected).await {
            tracing::warn!(error = %e, "Chain id check failed");
        }
    }

    monitor.start().await;

    let shutdown = Shutdown::new();

    let _config_watcher = if args.watch_config {
        let (watcher, mut updates) = ConfigWatcher::new(&args.config, config.clone());
        let handle = watcher.run()?;
        let monitor = monitor.clone();
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.recv() => break,
                    update = updates.recv() => match update {
                        Some(policy) => {
                            if let Err(e) = monitor.reload_policy(&policy) {
                                tracing::error!(error = %e, "Rejected reloaded policy");
                            }
                        }
                        None => break,
                    },
                }
            }
        });
        Some(handle)
    } else {
        None
    };

    if args.feed_stdin || config.feed.stdin_enabled {
        let queue = monitor.feed_sender();
        let signal = shutdown.subscribe();
        let stats = monitor.metrics();
        tokio::spawn(async move {
            match pump_lines(BufReader::new(tokio::io::stdin()), queue, signal, stats).await {
                Ok(forwarded) => tracing::info!(forwarded, "Watch feed closed"),
                Err(e) => tracing::error!(error = %e, "Watch feed failed"),
            }
        });
        tracing::info!("Reading watch updates from stdin");
    }

    let signal = wait_for_signal().await;
    tracing::info!(signal, "Shutdown requested");

    shutdown.trigger();
    monitor.stop().await;
    monitor.metrics().log_summary(monitor.profile().name());

    let health = monitor.health();
    tracing::info!(
        pending = health.pending_count,
        last_block = health.last_processed_block,
        "Shutdown complete"
    );
    Ok(())
}

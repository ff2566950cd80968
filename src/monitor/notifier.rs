//! Sinks for terminal events.
//!
//! - `LogNotifier`: structured log line per event
//! - `ChannelNotifier`: bounded in-process channel
//! - `WebhookNotifier`: JSON POST to an HTTP endpoint

use std::time::Duration;

use alloy::primitives::{Address, TxHash, B256};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

use crate::config::schema::NotifierConfig;
use crate::monitor::types::{unix_now, ConfirmationStatus, MatchReason, TerminalEvent};
use crate::resilience::retries::RetryPolicy;

/// Longest response body quoted in a delivery error.
const MAX_ERROR_BODY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    Closed,
    #[error("notification channel full")]
    Full,
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("notifier setup: {0}")]
    Setup(String),
}

/// Receives each terminal transition at least once.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &TerminalEvent) -> Result<(), NotifyError>;
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &TerminalEvent) -> Result<(), NotifyError> {
        let tx = &event.transaction;
        match event.status {
            ConfirmationStatus::Confirmed => tracing::info!(
                target: "notifier",
                status = %event.status,
                chain = %tx.chain,
                tx = %tx.hash,
                symbol = %tx.symbol,
                amount = tx.amount,
                from = %tx.from,
                to = %tx.to,
                confirmations = event.confirmations,
                "Transfer final"
            ),
            _ => tracing::warn!(
                target: "notifier",
                status = %event.status,
                chain = %tx.chain,
                tx = %tx.hash,
                symbol = %tx.symbol,
                "Transfer not finalized"
            ),
        }
        Ok(())
    }
}

/// Forwards events into a bounded channel. A full channel is a delivery
/// failure, so the monitor will retry the event later.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<TerminalEvent>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TerminalEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, event: &TerminalEvent) -> Result<(), NotifyError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::Full,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
        })
    }
}

/// Body of a webhook request.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    status: ConfirmationStatus,
    chain: &'a str,
    tx_hash: TxHash,
    block_number: u64,
    block_hash: B256,
    from_address: Address,
    to_address: Address,
    token_symbol: &'a str,
    token_address: Option<Address>,
    amount: f64,
    /// Smallest units, decimal string.
    raw_amount: String,
    reason: MatchReason,
    high_value: bool,
    confirmations: u64,
    required_confirmations: u64,
    receipt_succeeded: Option<bool>,
    discovered_at: u64,
    sent_at: u64,
    attempt: u32,
    service: &'static str,
}

impl<'a> WebhookPayload<'a> {
    fn new(event: &'a TerminalEvent, attempt: u32) -> Self {
        let tx = &event.transaction;
        Self {
            kind: "transfer",
            status: event.status,
            chain: &tx.chain,
            tx_hash: tx.hash,
            block_number: tx.block_number,
            block_hash: tx.block_hash,
            from_address: tx.from,
            to_address: tx.to,
            token_symbol: &tx.symbol,
            token_address: tx.contract,
            amount: tx.amount,
            raw_amount: tx.raw_amount.to_string(),
            reason: tx.reason,
            high_value: tx.high_value,
            confirmations: event.confirmations,
            required_confirmations: event.required_confirmations,
            receipt_succeeded: event.receipt_succeeded,
            discovered_at: tx.discovered_at,
            sent_at: unix_now(),
            attempt,
            service: env!("CARGO_PKG_NAME"),
        }
    }
}

/// Posts each event as JSON. Any non-2xx answer is a delivery failure.
///
/// Attempts within one delivery follow the retry policy. When they run out
/// the monitor keeps the event and offers it again on the next tick.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Url,
    retry: RetryPolicy,
    confirmed_only: bool,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let url = url
            .parse::<Url>()
            .map_err(|e| NotifyError::Setup(format!("invalid webhook URL '{}': {}", url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NotifyError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            url,
            retry: RetryPolicy::none(),
            confirmed_only: true,
        })
    }

    /// `None` when no webhook is configured.
    pub fn from_config(config: &NotifierConfig) -> Result<Option<Self>, NotifyError> {
        let Some(url) = &config.webhook_url else {
            return Ok(None);
        };
        let delay = Duration::from_millis(config.retry_delay_ms);
        let notifier = Self::new(url, Duration::from_secs(config.timeout_secs))?
            .with_retry(RetryPolicy {
                max_attempts: config.max_attempts.max(1),
                base_delay: delay,
                max_delay: delay,
            })
            .confirmed_only(config.confirmed_only);
        Ok(Some(notifier))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Only post confirmed transfers; other terminal events are logged.
    pub fn confirmed_only(mut self, confirmed_only: bool) -> Self {
        self.confirmed_only = confirmed_only;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
        }
        Err(NotifyError::Delivery(format!("HTTP {}: {}", status, body)))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &TerminalEvent) -> Result<(), NotifyError> {
        if self.confirmed_only && event.status != ConfirmationStatus::Confirmed {
            return LogNotifier.notify(event).await;
        }

        let mut attempt = 0;
        self.retry
            .run(
                "webhook",
                |e: &NotifyError| matches!(e, NotifyError::Delivery(_)),
                || {
                    attempt += 1;
                    let payload = WebhookPayload::new(event, attempt);
                    async move { self.post(&payload).await }
                },
            )
            .await?;

        tracing::info!(
            target: "notifier",
            tx = %event.transaction.hash,
            status = %event.status,
            attempts = attempt,
            "Webhook delivered"
        );
        Ok(())
    }
}

//! Delivery of emitted messages between chain actors, with retry

use eyre::{eyre, Result};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use token_bridge::{BridgeError, BridgeMessage, ChainId, Delivery, ErrorKind, MessageId};

use crate::chain::ChainHandle;
use crate::config::RelayerConfig;

/// Retry configuration for message delivery
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn from_config(config: &RelayerConfig) -> Self {
        Self {
            max_retries: config.retry_attempts,
            initial_backoff: Duration::from_millis(config.retry_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            ..Self::default()
        }
    }

    /// Calculate backoff duration for a given attempt
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs = self.initial_backoff.as_secs_f64()
            * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Counters kept by the relay loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub delivered: usize,
    pub failed: usize,
    pub duplicates: usize,
    /// Messages given up on, with the last error
    pub dead_letters: Vec<(MessageId, String)>,
}

/// Carries messages from the outbox to their destination actors
pub struct Relayer {
    chains: BTreeMap<ChainId, ChainHandle>,
    outbox: mpsc::UnboundedReceiver<BridgeMessage>,
    retry: RetryConfig,
    delivery_delay: Duration,
    stats: RelayStats,
    stopped: bool,
}

impl Relayer {
    pub fn new(
        chains: BTreeMap<ChainId, ChainHandle>,
        outbox: mpsc::UnboundedReceiver<BridgeMessage>,
        config: &RelayerConfig,
    ) -> Self {
        Self {
            chains,
            outbox,
            retry: RetryConfig::from_config(config),
            delivery_delay: config.delivery_delay(),
            stats: RelayStats::default(),
            stopped: false,
        }
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Whether a shutdown signal has been received
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Deliver queued messages until the outbox is empty or shutdown is signalled
    ///
    /// Forwarded legs are emitted before a delivery returns, so an empty
    /// outbox after a delivery means every transfer has come to rest.
    pub async fn run_until_idle(&mut self, shutdown: &mut mpsc::Receiver<()>) -> Result<()> {
        while !self.stopped {
            let message = match self.outbox.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Empty) => {
                    tracing::debug!(stats = ?self.stats, "Relay idle");
                    return Ok(());
                }
                Err(TryRecvError::Disconnected) => {
                    return Err(eyre!("Relay outbox closed"));
                }
            };

            tokio::select! {
                _ = self.relay(message) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping relay");
                    self.stopped = true;
                }
            }
        }
        Ok(())
    }

    async fn relay(&mut self, message: BridgeMessage) {
        if !self.delivery_delay.is_zero() {
            tokio::time::sleep(self.delivery_delay).await;
        }

        let mut attempt = 0;
        loop {
            match self.deliver_once(&message).await {
                Ok(delivery) => {
                    self.record(&message, &delivery).await;
                    return;
                }
                Err(e) if is_permanent(&e) || !self.retry.should_retry(attempt) => {
                    tracing::error!(
                        message_id = %message.message_id,
                        destination = %message.destination_chain,
                        attempts = attempt + 1,
                        error = %e,
                        "Giving up on message"
                    );
                    self.stats
                        .dead_letters
                        .push((message.message_id, e.to_string()));
                    return;
                }
                Err(e) => {
                    let backoff = self.retry.backoff_for_attempt(attempt);
                    attempt += 1;
                    tracing::warn!(
                        message_id = %message.message_id,
                        error = %e,
                        attempt,
                        next_backoff_ms = backoff.as_millis() as u64,
                        "Delivery failed, will retry with backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn deliver_once(&self, message: &BridgeMessage) -> Result<Delivery> {
        let destination = self
            .chains
            .get(&message.destination_chain)
            .ok_or(BridgeError::UnknownPairing {
                chain_id: message.destination_chain,
            })?;
        destination.deliver(message.clone()).await
    }

    async fn record(&mut self, message: &BridgeMessage, delivery: &Delivery) {
        let receipt = delivery.receipt();
        if delivery.is_duplicate() {
            self.stats.duplicates += 1;
            tracing::debug!(message_id = %message.message_id, "Duplicate delivery");
        } else if receipt.is_failed() {
            self.stats.failed += 1;
        } else {
            self.stats.delivered += 1;
        }

        // The sender closes its record with the receiver's outcome. A repeat
        // carries the first outcome, so a lost confirmation is made good here.
        if let Some(source) = self.chains.get(&message.source_chain) {
            match source.confirm(receipt.clone()).await {
                Ok(state) => tracing::debug!(
                    message_id = %message.message_id,
                    state = %state,
                    "Sender confirmed"
                ),
                Err(e) => tracing::warn!(
                    message_id = %message.message_id,
                    error = %e,
                    "Sender could not confirm delivery"
                ),
            }
        }
    }
}

/// Errors a retry cannot fix
fn is_permanent(error: &eyre::Report) -> bool {
    matches!(
        error.downcast_ref::<BridgeError>().map(BridgeError::kind),
        Some(ErrorKind::InvalidInput) | Some(ErrorKind::UnknownPairing)
    )
}

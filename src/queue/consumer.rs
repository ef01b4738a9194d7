/// Durable queue consumer
///
/// Polls the queue in batches, relays each message through the router and acknowledges
/// it on success. A message that keeps failing is deleted anyway once its dequeue
/// count exceeds `max_dequeue_count` (poison eviction). Failures never stop the loop.
use super::{NotificationQueue, QueueMessage};
use crate::arguments::is_debug_queue_enabled;
use crate::config::QueueConfig;
use crate::errors::{RelayError, RelayResult};
use crate::logger::{self, LogTag};
use crate::notifications::{decode, NotificationRouter, RelayOutcome};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerOptions {
    pub batch_size: usize,
    /// Wait after an empty poll
    pub idle_delay: Duration,
    pub max_dequeue_count: u32,
    /// Upper bound for relaying a single message
    pub dispatch_timeout: Duration,
    /// Wait after a failed poll
    pub error_backoff: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for ConsumerOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            idle_delay: Duration::from_secs(config.idle_delay_secs.max(1)),
            max_dequeue_count: config.max_dequeue_count,
            dispatch_timeout: Duration::from_secs(config.dispatch_timeout_secs.max(1)),
            error_backoff: Duration::from_secs(config.error_backoff_secs.max(1)),
        }
    }
}

/// What happened to one received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Relayed (or intentionally ignored) and deleted
    Acknowledged,
    /// Failed and deleted because it was delivered too often
    Evicted,
    /// Left on the queue for redelivery
    Retained,
}

#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    acknowledged: AtomicU64,
    evicted: AtomicU64,
    retained: AtomicU64,
    /// Failures that no redelivery can fix (undecodable envelopes)
    permanent_failures: AtomicU64,
    poll_errors: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub received: u64,
    pub acknowledged: u64,
    pub evicted: u64,
    pub retained: u64,
    pub permanent_failures: u64,
    pub poll_errors: u64,
}

impl ConsumerStats {
    fn record(&self, outcome: MessageOutcome) {
        let counter = match outcome {
            MessageOutcome::Acknowledged => &self.acknowledged,
            MessageOutcome::Evicted => &self.evicted,
            MessageOutcome::Retained => &self.retained,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            retained: self.retained.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
        }
    }
}

pub struct QueueConsumer {
    queue: Arc<dyn NotificationQueue>,
    router: NotificationRouter,
    options: ConsumerOptions,
    stats: Arc<ConsumerStats>,
}

impl QueueConsumer {
    pub fn new(
        queue: Arc<dyn NotificationQueue>,
        router: NotificationRouter,
        options: ConsumerOptions,
    ) -> Self {
        Self {
            queue,
            router,
            options,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    /// Record into an externally owned stats block
    pub fn with_stats(mut self, stats: Arc<ConsumerStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        self.stats.clone()
    }

    /// Poll until cancelled. Only the idle and back-off waits race cancellation, so a
    /// batch that has started is processed to the end.
    pub async fn run(&self, cancel: CancellationToken) {
        logger::info(
            LogTag::Queue,
            &format!(
                "Consuming {} queue (batch={}, idle={}s, max_dequeue={})",
                self.queue.name(),
                self.options.batch_size,
                self.options.idle_delay.as_secs(),
                self.options.max_dequeue_count
            ),
        );

        while !cancel.is_cancelled() {
            let wait = match self.poll_once().await {
                Ok(0) => self.options.idle_delay,
                Ok(_) => continue,
                Err(e) => {
                    self.stats.poll_errors.fetch_add(1, Ordering::Relaxed);
                    logger::error(LogTag::Queue, &format!("Queue poll failed: {}", e));
                    self.options.error_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        logger::info(LogTag::Queue, "Queue consumer stopped");
    }

    /// Receive and process one batch; returns the number of messages received
    pub async fn poll_once(&self) -> RelayResult<usize> {
        let batch = self.queue.receive(self.options.batch_size).await?;
        let received = batch.len();
        self.stats
            .received
            .fetch_add(received as u64, Ordering::Relaxed);

        if received > 0 && is_debug_queue_enabled() {
            logger::debug(LogTag::Queue, &format!("Received {} message(s)", received));
        }

        for message in &batch {
            self.process_message(message).await;
        }

        Ok(received)
    }

    /// Relay one message and acknowledge, evict or retain it. Never fails.
    pub async fn process_message(&self, message: &QueueMessage) -> MessageOutcome {
        let outcome = match self.dispatch(message).await {
            Ok(relayed) => {
                if is_debug_queue_enabled() {
                    logger::debug(
                        LogTag::Queue,
                        &format!("Message {} relayed: {:?}", message.id, relayed),
                    );
                }
                self.delete(message, MessageOutcome::Acknowledged).await
            }
            Err(e) => {
                let kind = if e.is_recoverable() {
                    "will retry"
                } else {
                    self.stats.permanent_failures.fetch_add(1, Ordering::Relaxed);
                    "permanent"
                };
                logger::error(
                    LogTag::Queue,
                    &format!(
                        "Message {} failed, {} (dequeue_count={}): {}",
                        message.id, kind, message.dequeue_count, e
                    ),
                );
                if message.dequeue_count > self.options.max_dequeue_count {
                    logger::warning(
                        LogTag::Queue,
                        &format!(
                            "Evicting poison message {} after {} deliveries",
                            message.id, message.dequeue_count
                        ),
                    );
                    self.delete(message, MessageOutcome::Evicted).await
                } else {
                    MessageOutcome::Retained
                }
            }
        };

        self.stats.record(outcome);
        outcome
    }

    async fn dispatch(&self, message: &QueueMessage) -> RelayResult<RelayOutcome> {
        let decoded = decode(&message.body)?;
        let timeout = self.options.dispatch_timeout;
        tokio::time::timeout(timeout, self.router.relay_decoded(decoded))
            .await
            .map_err(|_| RelayError::Timeout {
                millis: timeout.as_millis() as u64,
            })?
    }

    async fn delete(&self, message: &QueueMessage, outcome: MessageOutcome) -> MessageOutcome {
        match self.queue.delete(message).await {
            Ok(()) => outcome,
            Err(e) => {
                logger::error(
                    LogTag::Queue,
                    &format!("Failed to delete message {}: {}", message.id, e),
                );
                MessageOutcome::Retained
            }
        }
    }
}

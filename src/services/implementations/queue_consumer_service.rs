use crate::config::Config;
use crate::errors::{RelayError, RelayResult};
use crate::relay::Relay;
use crate::services::{Service, ServiceHealth};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Drains the durable notification queue into the router
pub struct QueueConsumerService {
    relay: Arc<Relay>,
}

impl QueueConsumerService {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl Service for QueueConsumerService {
    fn name(&self) -> &'static str {
        "queue_consumer"
    }

    fn priority(&self) -> i32 {
        40
    }

    /// Sends must reach other instances from the first message on
    fn dependencies(&self) -> Vec<&'static str> {
        vec!["backplane"]
    }

    fn is_enabled(&self, config: &Config) -> bool {
        config.queue.is_enabled()
    }

    async fn start(&mut self, shutdown: CancellationToken) -> RelayResult<Vec<JoinHandle<()>>> {
        let consumer = self.relay.consumer().ok_or_else(|| {
            RelayError::service(self.name(), "queue enabled in config but not constructed")
        })?;

        Ok(vec![tokio::spawn(async move {
            consumer.run(shutdown).await;
        })])
    }

    async fn health(&self) -> ServiceHealth {
        let stats = self.relay.consumer_stats.snapshot();
        if stats.poll_errors > 0 && stats.received == 0 {
            ServiceHealth::Degraded(format!(
                "{} poll error(s), nothing received",
                stats.poll_errors
            ))
        } else {
            ServiceHealth::Healthy
        }
    }
}

//! Durable at-least-once notification queue and its consumer
//!
//! Receiving a message hides it for the visibility timeout and bumps its dequeue
//! count; a message that is not deleted with its latest pop receipt becomes visible
//! again and is redelivered.

pub mod consumer;
pub mod memory;
pub mod sqlite;

use crate::config::QueueConfig;
use crate::errors::{RelayError, RelayResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use consumer::{ConsumerOptions, ConsumerStats, ConsumerStatsSnapshot, MessageOutcome, QueueConsumer};
pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

/// A received message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    /// Opaque token proving this receive; required to delete the message
    pub pop_receipt: String,
    /// Times the message has been received, this receive included
    pub dequeue_count: u32,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait NotificationQueue: Send + Sync {
    fn name(&self) -> &'static str;

    /// Append a message; returns its id
    async fn enqueue(&self, body: Vec<u8>) -> RelayResult<String>;

    /// Receive up to `max_messages` visible messages, oldest first
    async fn receive(&self, max_messages: usize) -> RelayResult<Vec<QueueMessage>>;

    /// Delete a received message; fails when the pop receipt is stale
    async fn delete(&self, message: &QueueMessage) -> RelayResult<()>;
}

/// Build the configured queue; an empty connection string means none
///
/// Accepted connection strings: `memory` and `sqlite://<path>`.
pub fn from_config(config: &QueueConfig) -> RelayResult<Option<Arc<dyn NotificationQueue>>> {
    let connection = config.connection.trim();
    if connection.is_empty() {
        return Ok(None);
    }

    let visibility_timeout = Duration::from_secs(config.visibility_timeout_secs);

    if connection == "memory" {
        return Ok(Some(Arc::new(MemoryQueue::new(visibility_timeout))));
    }

    if let Some(path) = connection.strip_prefix("sqlite://") {
        return Ok(Some(Arc::new(SqliteQueue::open(path, visibility_timeout)?)));
    }

    Err(RelayError::Config(format!(
        "unsupported queue connection '{}'",
        connection
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = QueueConfig::default();
        assert!(from_config(&config).unwrap().is_none());

        config.connection = "memory".to_string();
        assert_eq!(from_config(&config).unwrap().unwrap().name(), "memory");

        config.connection = "amqp://broker".to_string();
        assert!(from_config(&config).is_err());
    }
}

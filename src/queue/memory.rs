/// In-process queue with visibility timeouts
///
/// Used by tests and single-binary setups where producers call `enqueue` directly.
use super::{NotificationQueue, QueueMessage};
use crate::errors::{RelayError, RelayResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct StoredMessage {
    id: String,
    body: Vec<u8>,
    dequeue_count: u32,
    visible_at: Instant,
    pop_receipt: Option<String>,
}

pub struct MemoryQueue {
    messages: Mutex<Vec<StoredMessage>>,
    visibility_timeout: Duration,
}

impl MemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            visibility_timeout,
        }
    }

    /// Messages still stored, visible or not
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue with a preset dequeue count (redelivery scenarios)
    pub fn enqueue_with_count(&self, body: Vec<u8>, dequeue_count: u32) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.messages.lock().push(StoredMessage {
            id: id.clone(),
            body,
            dequeue_count,
            visible_at: Instant::now(),
            pop_receipt: None,
        });
        id
    }
}

#[async_trait]
impl NotificationQueue for MemoryQueue {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn enqueue(&self, body: Vec<u8>) -> RelayResult<String> {
        Ok(self.enqueue_with_count(body, 0))
    }

    async fn receive(&self, max_messages: usize) -> RelayResult<Vec<QueueMessage>> {
        let now = Instant::now();
        let mut messages = self.messages.lock();
        let mut received = Vec::new();

        for stored in messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            if stored.visible_at > now {
                continue;
            }
            let receipt = uuid::Uuid::new_v4().to_string();
            stored.dequeue_count += 1;
            stored.visible_at = now + self.visibility_timeout;
            stored.pop_receipt = Some(receipt.clone());

            received.push(QueueMessage {
                id: stored.id.clone(),
                pop_receipt: receipt,
                dequeue_count: stored.dequeue_count,
                body: stored.body.clone(),
            });
        }

        Ok(received)
    }

    async fn delete(&self, message: &QueueMessage) -> RelayResult<()> {
        let mut messages = self.messages.lock();
        let position = messages.iter().position(|stored| {
            stored.id == message.id && stored.pop_receipt.as_deref() == Some(message.pop_receipt.as_str())
        });
        match position {
            Some(index) => {
                messages.remove(index);
                Ok(())
            }
            None => Err(RelayError::Queue(format!(
                "message {} not found or pop receipt is stale",
                message.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_visibility_timeout_redelivers() {
        let queue = MemoryQueue::new(Duration::from_secs(30));
        queue.enqueue(b"one".to_vec()).await.unwrap();

        let first = queue.receive(32).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].dequeue_count, 1);
        assert!(queue.receive(32).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(31)).await;
        let second = queue.receive(32).await.unwrap();
        assert_eq!(second[0].dequeue_count, 2);
        assert_ne!(second[0].pop_receipt, first[0].pop_receipt);

        // the first receipt is stale now
        assert!(queue.delete(&first[0]).await.is_err());
        queue.delete(&second[0]).await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_receive_respects_batch_size_and_order() {
        let queue = MemoryQueue::new(Duration::from_secs(30));
        for i in 0..5 {
            queue.enqueue(vec![i]).await.unwrap();
        }
        let batch = queue.receive(3).await.unwrap();
        let bodies: Vec<u8> = batch.iter().map(|m| m.body[0]).collect();
        assert_eq!(bodies, vec![0, 1, 2]);
        assert_eq!(queue.receive(10).await.unwrap().len(), 2);
    }
}

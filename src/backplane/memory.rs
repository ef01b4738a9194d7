/// In-process backplane over a tokio broadcast channel
///
/// Several relays in one process (tests, multi-hub binaries) share a `MemoryBus`;
/// each gets its own `MemoryBackplane` with a distinct instance id.
use super::{new_instance_id, Backplane, BackplaneMessage, SUBSCRIPTION_BUFFER};
use crate::errors::RelayResult;
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

const BUS_CAPACITY: usize = 4096;

#[derive(Clone)]
pub struct MemoryBus {
    sender: broadcast::Sender<(String, BackplaneMessage)>,
}

static GLOBAL_BUS: Lazy<MemoryBus> = Lazy::new(MemoryBus::new);

impl MemoryBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    pub fn global() -> Self {
        GLOBAL_BUS.clone()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MemoryBackplane {
    bus: MemoryBus,
    channel: String,
    instance_id: String,
}

impl MemoryBackplane {
    pub fn new(bus: MemoryBus, channel: impl Into<String>) -> Self {
        Self {
            bus,
            channel: channel.into(),
            instance_id: new_instance_id(),
        }
    }
}

#[async_trait]
impl Backplane for MemoryBackplane {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn channel(&self) -> &str {
        &self.channel
    }

    async fn publish(&self, message: BackplaneMessage) -> RelayResult<()> {
        // No subscribers yet is not an error: nobody else needs the send.
        let _ = self.bus.sender.send((self.channel.clone(), message));
        Ok(())
    }

    async fn subscribe(
        &self,
        cancel: CancellationToken,
    ) -> RelayResult<mpsc::Receiver<BackplaneMessage>> {
        let mut bus_rx = self.bus.sender.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let channel = self.channel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = bus_rx.recv() => match received {
                        Ok((message_channel, message)) => {
                            if message_channel != channel {
                                continue;
                            }
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            logger::warning(
                                LogTag::Backplane,
                                &format!("Memory backplane subscriber lagged, {} messages skipped", skipped),
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{HubKind, Scope};

    fn message(origin: &str, frame: &str) -> BackplaneMessage {
        BackplaneMessage::new(
            origin.to_string(),
            HubKind::Authenticated,
            Scope::Broadcast,
            frame.to_string(),
        )
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let bus = MemoryBus::new();
        let prod = MemoryBackplane::new(bus.clone(), "pushrelay:prod");
        let staging = MemoryBackplane::new(bus.clone(), "pushrelay:staging");
        let cancel = CancellationToken::new();

        let mut prod_rx = prod.subscribe(cancel.clone()).await.unwrap();
        let mut staging_rx = staging.subscribe(cancel.clone()).await.unwrap();

        prod.publish(message(prod.instance_id(), "p")).await.unwrap();
        staging.publish(message(staging.instance_id(), "s")).await.unwrap();

        assert_eq!(prod_rx.recv().await.unwrap().frame, "p");
        assert_eq!(staging_rx.recv().await.unwrap().frame, "s");
        assert!(prod_rx.try_recv().is_err());

        cancel.cancel();
        assert!(prod_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let backplane = MemoryBackplane::new(MemoryBus::new(), "c");
        assert!(backplane.publish(message("x", "f")).await.is_ok());
        assert_ne!(backplane.instance_id(), MemoryBackplane::new(MemoryBus::new(), "c").instance_id());
    }
}

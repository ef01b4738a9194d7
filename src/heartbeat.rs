/// Heartbeat broadcaster
///
/// Broadcasts a keep-alive frame on every registry once per interval. The first
/// heartbeat goes out one full interval after start.
use crate::arguments::is_debug_heartbeat_enabled;
use crate::hub::{ConnectionRegistry, ServerMessage};
use crate::logger::{self, LogTag};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(120);

pub struct HeartbeatBroadcaster {
    registries: Vec<Arc<dyn ConnectionRegistry>>,
    interval: Duration,
    ticks: AtomicU64,
}

impl HeartbeatBroadcaster {
    pub fn new(registries: Vec<Arc<dyn ConnectionRegistry>>, interval: Duration) -> Self {
        Self {
            registries,
            interval: interval.max(Duration::from_millis(1)),
            ticks: AtomicU64::new(0),
        }
    }

    /// Heartbeats sent so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);

        logger::info(
            LogTag::Heartbeat,
            &format!("Heartbeat every {}s", self.interval.as_secs()),
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.beat().await,
            }
        }

        logger::info(LogTag::Heartbeat, "Heartbeat stopped");
    }

    /// Broadcast one heartbeat on every registry
    pub async fn beat(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);

        let frame = match ServerMessage::heartbeat().to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                logger::error(LogTag::Heartbeat, &format!("Failed to build heartbeat: {}", e));
                return;
            }
        };

        for registry in &self.registries {
            match registry.broadcast(frame.clone()).await {
                Ok(report) => {
                    if is_debug_heartbeat_enabled() {
                        logger::debug(
                            LogTag::Heartbeat,
                            &format!("Heartbeat on {} reached {} connection(s)", registry.kind(), report.delivered),
                        );
                    }
                }
                Err(e) => logger::warning(
                    LogTag::Heartbeat,
                    &format!("Heartbeat broadcast on {} failed: {}", registry.kind(), e),
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{ConnectionCounter, Hub, HubKind, HubOptions, Principal};
    use crate::notifications::router::tests::RecordingRegistry;

    #[tokio::test(start_paused = true)]
    async fn test_one_broadcast_per_interval() {
        let registry = RecordingRegistry::new(HubKind::Authenticated);
        let broadcaster = Arc::new(HeartbeatBroadcaster::new(
            vec![registry.clone() as Arc<dyn ConnectionRegistry>],
            Duration::from_secs(120),
        ));
        let cancel = CancellationToken::new();

        let task = {
            let broadcaster = broadcaster.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { broadcaster.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(119)).await;
        assert_eq!(broadcaster.ticks(), 0);

        tokio::time::sleep(Duration::from_secs(3 * 120 - 119 + 1)).await;
        assert_eq!(broadcaster.ticks(), 3);
        assert_eq!(registry.scopes().len(), 3);
        assert!(registry
            .sends
            .lock()
            .iter()
            .all(|(_, frame)| frame.contains(r#""type":"heartbeat""#)));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_independent_of_connection_churn() {
        let hub = Hub::authenticated(
            None,
            HubOptions {
                buffer_size: 16,
                counter: ConnectionCounter::new(),
                backplane: None,
            },
        );
        let broadcaster = Arc::new(HeartbeatBroadcaster::new(
            vec![hub.clone() as Arc<dyn ConnectionRegistry>],
            Duration::from_secs(10),
        ));
        let cancel = CancellationToken::new();
        let task = {
            let broadcaster = broadcaster.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { broadcaster.run(cancel).await })
        };

        let principal = Principal::Authenticated(crate::hub::Identity::new(
            "u1",
            crate::notifications::ClientType::All,
            vec![],
        ));
        for _ in 0..6 {
            let registration = hub.register(&principal).unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            hub.unregister(registration.id);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(broadcaster.ticks(), 3);
        cancel.cancel();
        task.await.unwrap();
    }
}

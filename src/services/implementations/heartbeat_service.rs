use crate::config::Config;
use crate::errors::RelayResult;
use crate::heartbeat::HeartbeatBroadcaster;
use crate::relay::Relay;
use crate::services::{Service, ServiceHealth};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct HeartbeatService {
    relay: Arc<Relay>,
    broadcaster: Option<Arc<HeartbeatBroadcaster>>,
}

impl HeartbeatService {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay,
            broadcaster: None,
        }
    }
}

#[async_trait]
impl Service for HeartbeatService {
    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn is_enabled(&self, config: &Config) -> bool {
        config.heartbeat.enabled
    }

    async fn start(&mut self, shutdown: CancellationToken) -> RelayResult<Vec<JoinHandle<()>>> {
        let interval = Duration::from_secs(self.relay.config.heartbeat.interval_secs);
        let broadcaster = Arc::new(HeartbeatBroadcaster::new(
            self.relay.registries(),
            interval,
        ));
        self.broadcaster = Some(broadcaster.clone());

        Ok(vec![tokio::spawn(async move {
            broadcaster.run(shutdown).await;
        })])
    }

    async fn health(&self) -> ServiceHealth {
        match self.broadcaster {
            Some(_) => ServiceHealth::Healthy,
            None => ServiceHealth::Starting,
        }
    }
}

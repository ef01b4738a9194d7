use crate::backplane::spawn_listener;
use crate::config::Config;
use crate::errors::{RelayError, RelayResult};
use crate::logger::{self, LogTag};
use crate::relay::Relay;
use crate::services::{Service, ServiceHealth};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Re-applies sends published by other relay instances
pub struct BackplaneService {
    relay: Arc<Relay>,
    listener_running: bool,
}

impl BackplaneService {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay,
            listener_running: false,
        }
    }
}

#[async_trait]
impl Service for BackplaneService {
    fn name(&self) -> &'static str {
        "backplane"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn is_enabled(&self, config: &Config) -> bool {
        config.backplane.is_enabled()
    }

    async fn start(&mut self, shutdown: CancellationToken) -> RelayResult<Vec<JoinHandle<()>>> {
        let Some(backplane) = self.relay.backplane.clone() else {
            return Err(RelayError::service(
                self.name(),
                "backplane enabled in config but not constructed",
            ));
        };

        let handle = spawn_listener(backplane, self.relay.hubs(), shutdown).await?;
        self.listener_running = true;
        Ok(vec![handle])
    }

    async fn stop(&mut self) -> RelayResult<()> {
        self.listener_running = false;
        logger::debug(LogTag::Backplane, "Backplane listener stopping");
        Ok(())
    }

    async fn health(&self) -> ServiceHealth {
        if self.listener_running {
            ServiceHealth::Healthy
        } else {
            ServiceHealth::Starting
        }
    }
}

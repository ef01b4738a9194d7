use crate::config::Config;
use crate::errors::RelayResult;
use crate::logger::{self, LogTag};
use crate::relay::Relay;
use crate::services::{Service, ServiceHealth};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Hosts `/hub`, `/anonymous-hub`, `/send`, `/alive` and `/status`
pub struct WebserverService {
    relay: Arc<Relay>,
    endpoint: Option<String>,
}

impl WebserverService {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay,
            endpoint: None,
        }
    }

    /// Bound address once started; useful when the configured port is 0
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }
}

#[async_trait]
impl Service for WebserverService {
    fn name(&self) -> &'static str {
        "webserver"
    }

    fn priority(&self) -> i32 {
        20
    }

    /// Remote sends must be applied before local clients can connect
    fn dependencies(&self) -> Vec<&'static str> {
        vec!["backplane"]
    }

    fn is_enabled(&self, config: &Config) -> bool {
        config.webserver.enabled
    }

    async fn start(&mut self, shutdown: CancellationToken) -> RelayResult<Vec<JoinHandle<()>>> {
        // Bind before spawning so port errors fail startup
        let listener = crate::webserver::bind_listener(&self.relay.config.webserver).await?;
        let endpoint = format!("http://{}", listener.local_addr()?);
        self.endpoint = Some(endpoint.clone());

        let relay = self.relay.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = crate::webserver::serve(listener, relay, shutdown).await {
                logger::error(LogTag::Webserver, &format!("Webserver failed: {}", e));
            }
        });

        logger::info(LogTag::Webserver, &format!("Webserver ready at {}", endpoint));
        Ok(vec![handle])
    }

    async fn health(&self) -> ServiceHealth {
        match self.endpoint {
            Some(_) => ServiceHealth::Healthy,
            None => ServiceHealth::Starting,
        }
    }
}

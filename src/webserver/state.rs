/// Shared application state for the webserver
use crate::config::WebserverConfig;
use crate::relay::Relay;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared application state passed to all route handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,

    /// Webserver section of the relay's configuration
    pub config: Arc<WebserverConfig>,

    /// Cancelled when the server shuts down; live connections watch it
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(relay: Arc<Relay>, shutdown: CancellationToken) -> Self {
        let config = Arc::new(relay.config.webserver.clone());
        Self {
            relay,
            config,
            shutdown,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.relay.uptime_seconds() as u64
    }
}

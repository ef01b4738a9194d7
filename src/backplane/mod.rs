//! Cross-instance backplane
//!
//! Every hub send is published on a deployment-wide channel; every instance listens
//! and repeats sends that originated elsewhere on its own connections.

pub mod listener;
pub mod memory;
pub mod sqlite;

use crate::config::BackplaneConfig;
use crate::errors::{RelayError, RelayResult};
use crate::hub::{HubKind, Scope};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use listener::spawn_listener;
pub use memory::{MemoryBackplane, MemoryBus};
pub use sqlite::SqliteBackplane;

/// Buffered messages per subscription
pub const SUBSCRIPTION_BUFFER: usize = 1024;

/// One mirrored hub send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackplaneMessage {
    /// Instance id of the publisher
    pub origin: String,
    pub hub: HubKind,
    pub scope: Scope,
    /// Pre-serialized client frame
    pub frame: String,
}

impl BackplaneMessage {
    pub fn new(origin: String, hub: HubKind, scope: Scope, frame: String) -> Self {
        Self {
            origin,
            hub,
            scope,
            frame,
        }
    }
}

#[async_trait]
pub trait Backplane: Send + Sync {
    fn name(&self) -> &'static str;

    /// Unique id of this relay instance on the channel
    fn instance_id(&self) -> &str;

    fn channel(&self) -> &str;

    async fn publish(&self, message: BackplaneMessage) -> RelayResult<()>;

    /// Stream of every message on the channel (own messages included) until cancelled
    async fn subscribe(
        &self,
        cancel: CancellationToken,
    ) -> RelayResult<mpsc::Receiver<BackplaneMessage>>;
}

pub fn new_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Build the configured backplane; an empty connection string means none
///
/// Accepted connection strings: `memory` (process-wide bus) and `sqlite://<path>`.
pub fn from_config(config: &BackplaneConfig) -> RelayResult<Option<Arc<dyn Backplane>>> {
    let connection = config.connection.trim();
    if connection.is_empty() {
        return Ok(None);
    }

    let channel = config.channel();
    if connection == "memory" {
        let backplane = MemoryBackplane::new(MemoryBus::global(), channel);
        return Ok(Some(Arc::new(backplane)));
    }

    if let Some(path) = connection.strip_prefix("sqlite://") {
        let backplane = SqliteBackplane::open(
            path,
            channel,
            Duration::from_millis(config.poll_interval_ms.max(10)),
            Duration::from_secs(config.retention_secs),
        )?;
        return Ok(Some(Arc::new(backplane)));
    }

    Err(RelayError::Config(format!(
        "unsupported backplane connection '{}'",
        connection
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = BackplaneConfig::default();
        assert!(from_config(&config).unwrap().is_none());

        config.connection = "memory".to_string();
        config.environment = "test".to_string();
        let backplane = from_config(&config).unwrap().unwrap();
        assert_eq!(backplane.name(), "memory");
        assert_eq!(backplane.channel(), "pushrelay:test");

        config.connection = "redis://localhost".to_string();
        assert!(matches!(from_config(&config), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_message_wire_format() {
        let message = BackplaneMessage::new(
            "i1".to_string(),
            HubKind::Anonymous,
            Scope::Group("token:r1".to_string()),
            "{}".to_string(),
        );
        let json = serde_json::to_string(&message).unwrap();
        let parsed: BackplaneMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, message);
        assert!(json.contains(r#""hub":"anonymous""#));
    }
}

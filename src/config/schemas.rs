/// Configuration schemas, one section per relay concern
///
/// Every section is declared through `config_struct!`, so each field carries its
/// default next to its type.
use crate::config_struct;
use std::time::Duration;

/// Floor applied to `send_timeout_ms`
pub const MIN_SEND_TIMEOUT_MS: u64 = 100;

// ============================================================================
// WEBSERVER
// ============================================================================

config_struct! {
    /// HTTP/WebSocket endpoint configuration
    pub struct WebserverConfig {
        enabled: bool = true,
        host: String = "127.0.0.1".to_string(),
        port: u16 = 5080,

        /// Upper bound for a single socket write
        send_timeout_ms: u64 = 5_000,
        /// Outbound frames buffered per connection before frames are dropped
        client_buffer_size: usize = 256,

        /// Close connections that sent nothing for this long
        idle_timeout_secs: u64 = 300,
        ping_interval_secs: u64 = 30,
        /// Missed pongs tolerated before the connection is closed
        max_missed_pongs: u32 = 3,

        /// Decode `Identity` from `identity_header` (only behind a trusted gateway)
        trust_identity_header: bool = false,
        identity_header: String = "X-Relay-Identity".to_string(),

        /// Shared key for `POST /send`; empty disables the endpoint
        internal_api_key: String = String::new(),
    }
}

impl WebserverConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Never below `MIN_SEND_TIMEOUT_MS`; a zero timeout would fail every write
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms.max(MIN_SEND_TIMEOUT_MS))
    }
}

// ============================================================================
// DURABLE QUEUE
// ============================================================================

config_struct! {
    /// Durable queue consumer configuration
    pub struct QueueConfig {
        /// `memory` or `sqlite://<path>`; empty disables the consumer
        connection: String = String::new(),
        batch_size: usize = 32,
        idle_delay_secs: u64 = 5,
        /// Failed messages are deleted once their dequeue count exceeds this
        max_dequeue_count: u32 = 2,
        visibility_timeout_secs: u64 = 30,
        dispatch_timeout_secs: u64 = 10,
        error_backoff_secs: u64 = 1,
    }
}

impl QueueConfig {
    pub fn is_enabled(&self) -> bool {
        !self.connection.trim().is_empty()
    }
}

// ============================================================================
// BACKPLANE
// ============================================================================

config_struct! {
    /// Cross-instance pub/sub configuration
    pub struct BackplaneConfig {
        /// `memory` or `sqlite://<path>`; empty means single-instance mode
        connection: String = String::new(),
        channel_prefix: String = "pushrelay".to_string(),
        environment: String = "production".to_string(),
        poll_interval_ms: u64 = 250,
        retention_secs: u64 = 300,
    }
}

impl BackplaneConfig {
    pub fn is_enabled(&self) -> bool {
        !self.connection.trim().is_empty()
    }

    /// Channel shared by every instance of one deployment
    pub fn channel(&self) -> String {
        format!("{}:{}", self.channel_prefix, self.environment)
    }
}

// ============================================================================
// HEARTBEAT
// ============================================================================

config_struct! {
    pub struct HeartbeatConfig {
        enabled: bool = true,
        interval_secs: u64 = 120,
    }
}

// ============================================================================
// INSTALLATION
// ============================================================================

config_struct! {
    /// Self-hosted installation identity
    pub struct InstallationConfig {
        /// When set, authenticated connections join `installation:{id}` groups
        id: String = String::new(),
    }
}

impl InstallationConfig {
    pub fn installation_id(&self) -> Option<String> {
        let id = self.id.trim();
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }
}

// ============================================================================
// SERVICES
// ============================================================================

config_struct! {
    pub struct ServicesConfig {
        /// Per-service wait for background tasks during shutdown
        shutdown_timeout_secs: u64 = 5,
    }
}

// ============================================================================
// ROOT
// ============================================================================

config_struct! {
    /// Root relay configuration
    pub struct Config {
        webserver: WebserverConfig = WebserverConfig::default(),
        queue: QueueConfig = QueueConfig::default(),
        backplane: BackplaneConfig = BackplaneConfig::default(),
        heartbeat: HeartbeatConfig = HeartbeatConfig::default(),
        installation: InstallationConfig = InstallationConfig::default(),
        services: ServicesConfig = ServicesConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [queue]
            connection = "memory"

            [heartbeat]
            interval_secs = 30
            "#,
        )
        .unwrap();

        assert!(config.queue.is_enabled());
        assert_eq!(config.queue.batch_size, 32);
        assert_eq!(config.queue.max_dequeue_count, 2);
        assert_eq!(config.heartbeat.interval_secs, 30);
        assert!(!config.backplane.is_enabled());
        assert_eq!(config.backplane.channel(), "pushrelay:production");
        assert_eq!(config.installation.installation_id(), None);
    }

    #[test]
    fn test_zero_send_timeout_is_floored() {
        let config: WebserverConfig = toml::from_str("send_timeout_ms = 0").unwrap();
        assert_eq!(config.send_timeout(), Duration::from_millis(MIN_SEND_TIMEOUT_MS));

        let config: WebserverConfig = toml::from_str("send_timeout_ms = 2500").unwrap();
        assert_eq!(config.send_timeout(), Duration::from_millis(2500));
    }
}

/// WebSocket connection health
///
/// Tracks client activity and protocol-level pings so dead sockets are reaped even
/// when nothing is being relayed to them.
use crate::config::WebserverConfig;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Quiet period after which the server pings the client
    pub ping_interval: Duration,

    /// No client activity for this long closes the connection
    pub idle_timeout: Duration,

    /// Unanswered pings tolerated before the connection is closed
    pub max_missed_pongs: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self::from(&WebserverConfig::default())
    }
}

impl From<&WebserverConfig> for HealthConfig {
    fn from(config: &WebserverConfig) -> Self {
        Self {
            ping_interval: Duration::from_secs(config.ping_interval_secs.max(1)),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs.max(1)),
            max_missed_pongs: config.max_missed_pongs.max(1),
        }
    }
}

#[derive(Debug)]
pub struct ConnectionHealth {
    last_activity: Instant,
    last_ping: Option<Instant>,
    missed_pongs: u32,
    config: HealthConfig,
}

impl ConnectionHealth {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            last_activity: Instant::now(),
            last_ping: None,
            missed_pongs: 0,
            config,
        }
    }

    /// Any inbound frame counts as activity and answers outstanding pings
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
        self.last_ping = None;
        self.missed_pongs = 0;
    }

    pub fn record_ping(&mut self) {
        self.last_ping = Some(Instant::now());
        self.missed_pongs += 1;
    }

    pub fn is_idle(&self) -> bool {
        self.last_activity.elapsed() > self.config.idle_timeout
    }

    /// The last allowed ping went unanswered for a full interval
    pub fn is_pong_overdue(&self) -> bool {
        self.missed_pongs >= self.config.max_missed_pongs
            && self
                .last_ping
                .map(|sent| sent.elapsed() > self.config.ping_interval)
                .unwrap_or(false)
    }

    pub fn needs_ping(&self) -> bool {
        if self.missed_pongs >= self.config.max_missed_pongs {
            return false;
        }
        let since = self.last_ping.unwrap_or(self.last_activity);
        since.elapsed() > self.config.ping_interval
    }

    pub fn seconds_since_activity(&self) -> u64 {
        self.last_activity.elapsed().as_secs()
    }
}

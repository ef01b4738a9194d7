/// Log tags, one per relay subsystem
///
/// Tags drive both the console label and the per-module debug switches
/// (`--debug-<key>` enables `Debug` output for the matching tag).

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Hub,
    Router,
    Queue,
    Heartbeat,
    Backplane,
    Webserver,
    Test,
    Other(String),
}

impl LogTag {
    /// Key used by `--debug-<key>` / `--verbose-<key>` flags
    pub fn to_debug_key(&self) -> String {
        match self {
            LogTag::System => "system".to_string(),
            LogTag::Config => "config".to_string(),
            LogTag::Hub => "hub".to_string(),
            LogTag::Router => "router".to_string(),
            LogTag::Queue => "queue".to_string(),
            LogTag::Heartbeat => "heartbeat".to_string(),
            LogTag::Backplane => "backplane".to_string(),
            LogTag::Webserver => "webserver".to_string(),
            LogTag::Test => "test".to_string(),
            LogTag::Other(name) => name.to_lowercase(),
        }
    }

    /// Uncolored label used in log files and tests
    pub fn to_plain_string(&self) -> String {
        match self {
            LogTag::System => "SYSTEM".to_string(),
            LogTag::Config => "CONFIG".to_string(),
            LogTag::Hub => "HUB".to_string(),
            LogTag::Router => "ROUTER".to_string(),
            LogTag::Queue => "QUEUE".to_string(),
            LogTag::Heartbeat => "HEARTBEAT".to_string(),
            LogTag::Backplane => "BACKPLANE".to_string(),
            LogTag::Webserver => "WEBSERVER".to_string(),
            LogTag::Test => "TEST".to_string(),
            LogTag::Other(name) => name.to_uppercase(),
        }
    }
}

impl std::fmt::Display for LogTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_plain_string())
    }
}

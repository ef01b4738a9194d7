/// Logger configuration derived from command-line arguments
///
/// Holds the minimum level and the per-tag debug/verbose switches. Stored in a
/// global `RwLock` so tests and embedding code can swap it at runtime.
use super::levels::LogLevel;
use super::tags::LogTag;
use crate::arguments;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Messages above this level are dropped (Debug/Verbose still need tag switches)
    pub min_level: LogLevel,
    /// Tags whose Debug output is enabled
    pub debug_tags: HashSet<String>,
    /// Tags whose Verbose output is enabled
    pub verbose_tags: HashSet<String>,
    /// When non-empty, only these tags log below Error
    pub enabled_tags: HashSet<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            verbose_tags: HashSet::new(),
            enabled_tags: HashSet::new(),
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG.read().clone()
}

pub fn set_logger_config(config: LoggerConfig) {
    *LOGGER_CONFIG.write() = config;
}

pub fn update_logger_config<F>(f: F)
where
    F: FnOnce(&mut LoggerConfig),
{
    let mut guard = LOGGER_CONFIG.write();
    f(&mut guard);
}

/// Build the logger configuration from the parsed arguments
pub fn init_from_args() {
    let mut config = LoggerConfig::default();

    if arguments::is_quiet_enabled() {
        config.min_level = LogLevel::Warning;
    }

    let debug_keys = arguments::enabled_debug_keys();
    if !debug_keys.is_empty() {
        config.min_level = LogLevel::Debug;
        config.debug_tags = debug_keys.into_iter().map(String::from).collect();
    }

    if arguments::is_verbose_enabled() {
        config.min_level = LogLevel::Verbose;
    }

    set_logger_config(config);
}

pub fn is_debug_enabled_for_tag(tag: &LogTag) -> bool {
    LOGGER_CONFIG.read().debug_tags.contains(&tag.to_debug_key())
}

pub fn is_verbose_enabled_for_tag(tag: &LogTag) -> bool {
    LOGGER_CONFIG
        .read()
        .verbose_tags
        .contains(&tag.to_debug_key())
}

//! Structured console logging for the relay
//!
//! - Standard levels (Error/Warning/Info/Debug/Verbose)
//! - Per-module debug control via `--debug-<module>` flags
//! - Colored, aligned, word-wrapped console output
//!
//! ```rust,ignore
//! use pushrelay::logger::{self, LogTag};
//!
//! logger::init();
//! logger::info(LogTag::Queue, "Consumer started");
//! logger::debug(LogTag::Hub, "Connection registered"); // only with --debug-hub
//! ```

mod config;
mod core;
mod format;
mod levels;
mod tags;

pub use config::{
    get_logger_config, init_from_args, set_logger_config, update_logger_config, LoggerConfig,
};
pub use levels::LogLevel;
pub use tags::LogTag;

/// Configure filtering from the parsed command-line arguments.
///
/// Call once at startup, after `arguments::init_from_env`.
pub fn init() {
    config::init_from_args();
}

/// Always shown.
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Shown unless `--quiet` raised the threshold.
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Only shown when `--debug-<module>` is set for the tag.
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Only shown with `--verbose`.
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}

/// Whether a message at `level` for `tag` would be printed
pub fn is_enabled(tag: &LogTag, level: LogLevel) -> bool {
    core::should_log(tag, level)
}

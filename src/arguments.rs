/// Centralized argument handling for the relay
///
/// Arguments are parsed once with clap and stored globally so any module can ask
/// whether its debug switch is on without threading flags through constructors.
use clap::Parser;
use once_cell::sync::{Lazy, OnceCell};

/// Command-line interface of the `pushrelay` binary
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "pushrelay",
    version,
    about = "Real-time notification relay (durable queue + WebSocket fan-out)"
)]
pub struct Arguments {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Override the webserver bind host
    #[arg(long)]
    pub host: Option<String>,

    /// Override the webserver bind port
    #[arg(long)]
    pub port: Option<u16>,

    /// Only show warnings and errors
    #[arg(long)]
    pub quiet: bool,

    /// Show verbose output for every module
    #[arg(long)]
    pub verbose: bool,

    #[arg(long = "debug-hub")]
    pub debug_hub: bool,

    #[arg(long = "debug-router")]
    pub debug_router: bool,

    #[arg(long = "debug-queue")]
    pub debug_queue: bool,

    #[arg(long = "debug-heartbeat")]
    pub debug_heartbeat: bool,

    #[arg(long = "debug-backplane")]
    pub debug_backplane: bool,

    #[arg(long = "debug-webserver")]
    pub debug_webserver: bool,

    #[arg(long = "debug-config")]
    pub debug_config: bool,

    /// Enable debug output for all modules
    #[arg(long = "debug-all")]
    pub debug_all: bool,
}

static ARGUMENTS: OnceCell<Arguments> = OnceCell::new();
static DEFAULT_ARGUMENTS: Lazy<Arguments> = Lazy::new(Arguments::default);

/// Parse the process arguments and store them globally
///
/// Calling this more than once keeps the first parse.
pub fn init_from_env() -> &'static Arguments {
    ARGUMENTS.get_or_init(Arguments::parse)
}

/// Store an explicit argument set (binaries with their own parser, tests)
pub fn set_arguments(args: Arguments) {
    let _ = ARGUMENTS.set(args);
}

/// Current arguments, or defaults when nothing was parsed yet
pub fn get_arguments() -> &'static Arguments {
    ARGUMENTS.get().unwrap_or(&DEFAULT_ARGUMENTS)
}

pub fn get_config_path_override() -> Option<String> {
    get_arguments().config.clone()
}

pub fn get_host_override() -> Option<String> {
    get_arguments().host.clone()
}

pub fn get_port_override() -> Option<u16> {
    get_arguments().port
}

pub fn is_quiet_enabled() -> bool {
    get_arguments().quiet
}

pub fn is_verbose_enabled() -> bool {
    get_arguments().verbose
}

// =============================================================================
// DEBUG FLAG CHECKING FUNCTIONS
// =============================================================================

pub fn is_debug_hub_enabled() -> bool {
    let args = get_arguments();
    args.debug_hub || args.debug_all
}

pub fn is_debug_router_enabled() -> bool {
    let args = get_arguments();
    args.debug_router || args.debug_all
}

pub fn is_debug_queue_enabled() -> bool {
    let args = get_arguments();
    args.debug_queue || args.debug_all
}

pub fn is_debug_heartbeat_enabled() -> bool {
    let args = get_arguments();
    args.debug_heartbeat || args.debug_all
}

pub fn is_debug_backplane_enabled() -> bool {
    let args = get_arguments();
    args.debug_backplane || args.debug_all
}

pub fn is_debug_webserver_enabled() -> bool {
    let args = get_arguments();
    args.debug_webserver || args.debug_all
}

pub fn is_debug_config_enabled() -> bool {
    let args = get_arguments();
    args.debug_config || args.debug_all
}

/// Debug keys that are switched on, in `LogTag::to_debug_key` form
pub fn enabled_debug_keys() -> Vec<&'static str> {
    let mut keys = Vec::new();
    if is_debug_hub_enabled() {
        keys.push("hub");
    }
    if is_debug_router_enabled() {
        keys.push("router");
    }
    if is_debug_queue_enabled() {
        keys.push("queue");
    }
    if is_debug_heartbeat_enabled() {
        keys.push("heartbeat");
    }
    if is_debug_backplane_enabled() {
        keys.push("backplane");
    }
    if is_debug_webserver_enabled() {
        keys.push("webserver");
    }
    if is_debug_config_enabled() {
        keys.push("config");
    }
    if get_arguments().debug_all {
        keys.push("system");
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_debug_flags() {
        let args = Arguments::parse_from([
            "pushrelay",
            "--config",
            "relay.toml",
            "--port",
            "9090",
            "--debug-queue",
        ]);
        assert_eq!(args.config.as_deref(), Some("relay.toml"));
        assert_eq!(args.port, Some(9090));
        assert!(args.debug_queue);
        assert!(!args.debug_hub);
    }

    #[test]
    fn test_defaults_without_parse() {
        let defaults = Arguments::default();
        assert!(defaults.config.is_none());
        assert!(!defaults.verbose);
    }
}

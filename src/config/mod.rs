//! Relay configuration: schemas with embedded defaults, TOML loading, global access

pub mod macros;
pub mod schemas;
pub mod utils;

pub use schemas::{
    BackplaneConfig, Config, HeartbeatConfig, InstallationConfig, QueueConfig, ServicesConfig,
    WebserverConfig,
};
pub use utils::{
    apply_overrides, get_config_clone, is_config_initialized, load_config,
    load_config_from_path, read_config_file, set_config, with_config, CONFIG_FILE_PATH,
};

/// Configuration loading and access helpers
///
/// The loaded configuration lives in a global `OnceCell<RwLock<Config>>` and is
/// read through `with_config` / `get_config_clone`.
use super::schemas::Config;
use crate::errors::{RelayError, RelayResult};
use crate::logger::{self, LogTag};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::path::Path;

pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

pub const CONFIG_FILE_PATH: &str = "data/pushrelay.toml";

/// Parse a configuration file without touching the global instance.
///
/// A missing file yields the defaults.
pub fn read_config_file(path: &str) -> RelayResult<Config> {
    if !Path::new(path).exists() {
        logger::warning(
            LogTag::Config,
            &format!("Config file '{}' not found, using default values", path),
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| RelayError::Config(format!("Failed to read '{}': {}", path, e)))?;
    toml::from_str::<Config>(&contents)
        .map_err(|e| RelayError::Config(format!("Failed to parse '{}': {}", path, e)))
}

/// Load a configuration file into the global instance.
///
/// Loading twice replaces the stored value.
pub fn load_config_from_path(path: &str) -> RelayResult<()> {
    let config = read_config_file(path)?;
    logger::debug(LogTag::Config, &format!("Loaded configuration from '{}'", path));
    set_config(config);
    Ok(())
}

pub fn load_config() -> RelayResult<()> {
    load_config_from_path(CONFIG_FILE_PATH)
}

/// Install an already-built configuration (embedding, tests)
pub fn set_config(config: Config) {
    match CONFIG.get() {
        Some(lock) => *lock.write() = config,
        None => {
            if let Err(rejected) = CONFIG.set(RwLock::new(config)) {
                // Lost an initialization race; overwrite the winner.
                if let Some(lock) = CONFIG.get() {
                    *lock.write() = rejected.into_inner();
                }
            }
        }
    }
}

pub fn is_config_initialized() -> bool {
    CONFIG.get().is_some()
}

/// Read access to the configuration; defaults are installed on first use.
pub fn with_config<F, R>(f: F) -> R
where
    F: FnOnce(&Config) -> R,
{
    let lock = CONFIG.get_or_init(|| RwLock::new(Config::default()));
    let guard = lock.read();
    f(&guard)
}

/// Owned copy for use across await points
pub fn get_config_clone() -> Config {
    with_config(|cfg| cfg.clone())
}

/// Apply command-line overrides on top of the loaded configuration
pub fn apply_overrides(host: Option<String>, port: Option<u16>) {
    if host.is_none() && port.is_none() {
        return;
    }
    let lock = CONFIG.get_or_init(|| RwLock::new(Config::default()));
    let mut config = lock.write();
    if let Some(host) = host {
        config.webserver.host = host;
    }
    if let Some(port) = port {
        config.webserver.port = port;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_missing_file_returns_defaults() {
        let config = read_config_file("/nonexistent/pushrelay.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_read_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[backplane]\nconnection = \"memory\"\nenvironment = \"staging\"\n"
        )
        .unwrap();

        let config = read_config_file(file.path().to_str().unwrap()).unwrap();
        assert!(config.backplane.is_enabled());
        assert_eq!(config.backplane.channel(), "pushrelay:staging");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[queue\nbatch_size = ").unwrap();

        let err = read_config_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }
}

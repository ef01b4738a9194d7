/// Relay process lifecycle
///
/// Loads configuration, assembles the relay, starts every enabled service through
/// the `ServiceManager` and tears them down again on a shutdown signal.
use std::sync::Arc;

use crate::{
    arguments,
    config::{self, CONFIG_FILE_PATH},
    errors::{RelayError, RelayResult},
    hub::global_counter,
    logger::{self, LogTag},
    relay::Relay,
    services::{implementations::*, ServiceManager},
};

/// Run the relay until a shutdown signal arrives
pub async fn run_relay() -> RelayResult<()> {
    logger::info(
        LogTag::System,
        &format!("pushrelay {} starting up...", env!("CARGO_PKG_VERSION")),
    );

    // Accounting starts from zero on every (re)initialization
    global_counter().reset();

    let config_path =
        arguments::get_config_path_override().unwrap_or_else(|| CONFIG_FILE_PATH.to_string());
    config::load_config_from_path(&config_path)?;
    config::apply_overrides(arguments::get_host_override(), arguments::get_port_override());

    let config = config::get_config_clone();
    if config.webserver.host == "0.0.0.0" {
        logger::warning(
            LogTag::System,
            "Binding to 0.0.0.0 allows remote access - ensure firewall is configured",
        );
    }
    if config.webserver.trust_identity_header {
        logger::warning(
            LogTag::System,
            &format!(
                "Trusting identities from the '{}' header; only expose this relay behind the gateway",
                config.webserver.identity_header
            ),
        );
    }

    let relay = Relay::from_config(config.clone())?;
    logger::info(
        LogTag::System,
        &format!(
            "Relay assembled (queue={}, backplane={}, installation={})",
            relay.queue.as_ref().map(|q| q.name()).unwrap_or("none"),
            relay.backplane.as_ref().map(|b| b.name()).unwrap_or("none"),
            config.installation.installation_id().as_deref().unwrap_or("none"),
        ),
    );

    let mut service_manager = ServiceManager::new(config);
    register_all_services(&mut service_manager, &relay);

    if let Err(e) = service_manager.start_all().await {
        logger::error(LogTag::System, &format!("Startup failed: {}", e));
        service_manager.stop_all().await?;
        return Err(e);
    }

    logger::info(LogTag::System, "Relay is running");
    wait_for_shutdown_signal().await?;

    service_manager.stop_all().await?;
    logger::info(LogTag::System, "Relay shut down cleanly");
    Ok(())
}

fn register_all_services(manager: &mut ServiceManager, relay: &Arc<Relay>) {
    logger::info(LogTag::System, "Registering services...");

    manager.register(Box::new(BackplaneService::new(relay.clone())));
    #[cfg(feature = "web")]
    manager.register(Box::new(WebserverService::new(relay.clone())));
    manager.register(Box::new(HeartbeatService::new(relay.clone())));
    manager.register(Box::new(QueueConsumerService::new(relay.clone())));
}

/// Wait for Ctrl+C, or SIGTERM on Unix
async fn wait_for_shutdown_signal() -> RelayResult<()> {
    logger::info(LogTag::System, "Waiting for shutdown signal (Ctrl+C)");

    #[cfg(unix)]
    let signal_name = {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| RelayError::service("run", format!("Failed to bind SIGINT: {}", e)))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| RelayError::service("run", format!("Failed to bind SIGTERM: {}", e)))?;

        tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        }
    };

    #[cfg(not(unix))]
    let signal_name = {
        tokio::signal::ctrl_c().await?;
        "CTRL_C"
    };

    logger::warning(
        LogTag::System,
        &format!("Shutdown signal received ({}), stopping services", signal_name),
    );

    // A second Ctrl+C during graceful shutdown exits immediately
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            logger::error(LogTag::System, "Second Ctrl+C detected, forcing immediate exit");
            std::process::exit(130);
        }
    });

    Ok(())
}

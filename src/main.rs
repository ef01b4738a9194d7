use pushrelay::{
    arguments,
    logger::{self, LogTag},
    run::run_relay,
};

/// Entry point for the relay
///
/// Parses arguments, initializes logging and runs every enabled service until a
/// shutdown signal arrives.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    arguments::init_from_env();
    logger::init();

    if let Err(e) = run_relay().await {
        logger::error(LogTag::System, &format!("Relay failed: {}", e));
        return Err(e.into());
    }

    Ok(())
}

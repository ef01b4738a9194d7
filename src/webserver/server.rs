/// Axum webserver lifecycle
///
/// Binding is split from serving so a bad address fails service startup instead of
/// a background task.
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{
    config::WebserverConfig,
    errors::{RelayError, RelayResult},
    logger::{self, LogTag},
    relay::Relay,
    webserver::{routes, state::AppState},
};

/// Bind the configured address
pub async fn bind_listener(config: &WebserverConfig) -> RelayResult<TcpListener> {
    let addr = config.bind_address();

    TcpListener::bind(&addr).await.map_err(|e| {
        let reason = match e.kind() {
            std::io::ErrorKind::AddrInUse => format!(
                "Failed to bind to {}: address already in use (is another relay running?)",
                addr
            ),
            std::io::ErrorKind::PermissionDenied => format!(
                "Failed to bind to {}: permission denied; use a port above 1024",
                addr
            ),
            _ => format!("Failed to bind to {}: {}", addr, e),
        };
        RelayError::service("webserver", reason)
    })
}

/// Build the application with all routes and middleware
pub fn build_router(state: Arc<AppState>) -> Router {
    routes::create_router(state)
}

/// Serve until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    relay: Arc<Relay>,
    shutdown: CancellationToken,
) -> RelayResult<()> {
    let local_addr = listener.local_addr()?;
    let state = Arc::new(AppState::new(relay, shutdown.clone()));
    let app = build_router(state);

    logger::info(
        LogTag::Webserver,
        &format!("Webserver listening on http://{}", local_addr),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            logger::debug(
                LogTag::Webserver,
                "Received shutdown signal, stopping webserver...",
            );
        })
        .await?;

    logger::info(LogTag::Webserver, "Webserver stopped");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use crate::hub::ConnectionCounter;

    /// State over a fresh relay with its own connection counter
    pub(crate) fn test_state(configure: impl FnOnce(&mut Config)) -> Arc<AppState> {
        let mut config = Config::default();
        configure(&mut config);
        let relay = Relay::builder()
            .counter(ConnectionCounter::new())
            .build(config)
            .unwrap();
        Arc::new(AppState::new(relay, CancellationToken::new()))
    }

    #[tokio::test]
    async fn test_bind_reports_address_in_use() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = WebserverConfig {
            port: taken.local_addr().unwrap().port(),
            ..WebserverConfig::default()
        };

        let err = bind_listener(&config).await.unwrap_err();
        assert!(err.to_string().contains("already in use"));
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay = test_state(|_| {}).relay.clone();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(listener, relay, shutdown.clone()));

        shutdown.cancel();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}

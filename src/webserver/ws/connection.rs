/// WebSocket connection handler
///
/// Drives one registered connection:
/// - Forwards frames queued by the hub to the client, each write bounded by the send timeout
/// - Answers client `ping` messages
/// - Pings quiet clients and closes idle or unresponsive ones
/// - Unregisters from the hub on every exit path
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{
    arguments::is_debug_webserver_enabled,
    config::WebserverConfig,
    errors::{RelayError, RelayResult},
    hub::{ClientMessage, ConnectionId, Hub, Registration, ServerMessage},
    logger::{self, LogTag},
};

use super::health::{ConnectionHealth, HealthConfig};

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(1);

type WsSink = SplitSink<WebSocket, Message>;

/// Run a registered connection until the client leaves, the hub drops it, the
/// connection goes unhealthy or the server shuts down
pub async fn handle_connection(
    socket: WebSocket,
    hub: Arc<Hub>,
    registration: Registration,
    config: &WebserverConfig,
    shutdown: CancellationToken,
) {
    let Registration {
        id: conn_id,
        receiver: mut hub_rx,
        groups,
    } = registration;

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut health = ConnectionHealth::new(HealthConfig::from(config));
    let send_timeout = config.send_timeout();
    let mut health_tick = tokio::time::interval(HEALTH_CHECK_INTERVAL);

    if is_debug_webserver_enabled() {
        logger::debug(
            LogTag::Webserver,
            &format!(
                "{} connection {} started (groups={:?})",
                hub.kind(),
                conn_id,
                groups
            ),
        );
    }

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                let _ = send_with_timeout(&mut ws_tx, Message::Close(None), send_timeout).await;
                break;
            }

            frame = hub_rx.recv() => {
                let Some(frame) = frame else {
                    // Hub evicted this connection
                    break;
                };
                if let Err(e) = send_with_timeout(&mut ws_tx, Message::Text(frame.to_string()), send_timeout).await {
                    logger::warning(
                        LogTag::Webserver,
                        &format!("Connection {}: failed to send frame: {}", conn_id, e),
                    );
                    break;
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        health.record_activity();
                        if let Err(e) = handle_client_message(&text, &mut ws_tx, conn_id, send_timeout).await {
                            logger::warning(
                                LogTag::Webserver,
                                &format!("Connection {}: error handling client message: {}", conn_id, e),
                            );
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {
                        health.record_activity();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        if is_debug_webserver_enabled() {
                            logger::debug(
                                LogTag::Webserver,
                                &format!("Connection {}: client closed", conn_id),
                            );
                        }
                        break;
                    }
                    Some(Err(e)) => {
                        logger::warning(
                            LogTag::Webserver,
                            &format!("Connection {}: websocket error: {}", conn_id, e),
                        );
                        break;
                    }
                }
            }

            _ = health_tick.tick() => {
                if health.is_idle() {
                    logger::warning(
                        LogTag::Webserver,
                        &format!(
                            "Connection {}: idle timeout ({}s)",
                            conn_id,
                            health.seconds_since_activity()
                        ),
                    );
                    break;
                }

                if health.is_pong_overdue() {
                    logger::warning(
                        LogTag::Webserver,
                        &format!("Connection {}: pong timeout", conn_id),
                    );
                    break;
                }

                if health.needs_ping() {
                    if send_with_timeout(&mut ws_tx, Message::Ping(vec![]), send_timeout).await.is_err() {
                        break;
                    }
                    health.record_ping();
                }
            }
        }
    }

    hub.unregister(conn_id);

    if is_debug_webserver_enabled() {
        logger::debug(
            LogTag::Webserver,
            &format!("{} connection {} closed", hub.kind(), conn_id),
        );
    }
}

async fn send_with_timeout(
    ws_tx: &mut WsSink,
    message: Message,
    timeout: Duration,
) -> RelayResult<()> {
    match tokio::time::timeout(timeout, ws_tx.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(RelayError::Transport(e.to_string())),
        Err(_) => Err(RelayError::Timeout {
            millis: timeout.as_millis() as u64,
        }),
    }
}

async fn handle_client_message(
    text: &str,
    ws_tx: &mut WsSink,
    conn_id: ConnectionId,
    timeout: Duration,
) -> RelayResult<()> {
    let response = match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping { id }) => ServerMessage::Pong { id },
        Err(e) => {
            if is_debug_webserver_enabled() {
                logger::debug(
                    LogTag::Webserver,
                    &format!("Connection {}: invalid client message: {}", conn_id, e),
                );
            }
            ServerMessage::Error {
                message: format!("Invalid client message: {}", e),
                code: "INVALID_MESSAGE".to_string(),
            }
        }
    };

    send_with_timeout(ws_tx, Message::Text(response.to_json()?), timeout).await
}

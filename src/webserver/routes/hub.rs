/// WebSocket endpoints
///
/// - `/hub`: authenticated clients; the `Identity` comes from request extensions
/// - `/anonymous-hub`: pairing sessions keyed by the `Token` query parameter
use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use serde::Deserialize;

use crate::{
    arguments::is_debug_webserver_enabled,
    hub::{Hub, Identity, Principal},
    logger::{self, LogTag},
    webserver::{state::AppState, utils::error_response, ws::handle_connection},
};

#[derive(Debug, Deserialize)]
pub struct AnonymousHubQuery {
    #[serde(rename = "Token", alias = "token")]
    pub token: Option<String>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/hub", get(hub_handler))
        .route("/anonymous-hub", get(anonymous_hub_handler))
}

/// GET /hub
async fn hub_handler(
    State(state): State<Arc<AppState>>,
    identity: Option<Extension<Identity>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(Extension(identity)) = identity else {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
            "An authenticated identity is required for /hub",
            None,
        );
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let hub = state.relay.hub.clone();
    ws.on_upgrade(move |socket| {
        run_socket(socket, state, hub, Principal::Authenticated(identity))
    })
}

/// GET /anonymous-hub?Token=...
async fn anonymous_hub_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnonymousHubQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = query.token.filter(|token| !token.trim().is_empty());
    let hub = state.relay.anonymous_hub.clone();
    ws.on_upgrade(move |socket| run_socket(socket, state, hub, Principal::Anonymous { token }))
}

async fn run_socket(socket: WebSocket, state: Arc<AppState>, hub: Arc<Hub>, principal: Principal) {
    let registration = match hub.register(&principal) {
        Ok(registration) => registration,
        Err(e) => {
            logger::error(
                LogTag::Webserver,
                &format!("Rejected {} connection: {}", hub.kind(), e),
            );
            return;
        }
    };

    if is_debug_webserver_enabled() {
        logger::debug(
            LogTag::Webserver,
            &format!(
                "{} connection {} opened (active={})",
                hub.kind(),
                registration.id,
                state.relay.counter.get()
            ),
        );
    }

    handle_connection(
        socket,
        hub,
        registration,
        &state.config,
        state.shutdown.clone(),
    )
    .await;
}

#[cfg(test)]
mod tests {
    use crate::webserver::server::tests::test_state;
    use crate::webserver::build_router;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_hub_requires_identity() {
        let app = build_router(test_state(|_| {}));
        let response = app
            .oneshot(Request::builder().uri("/hub").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_trusted_identity_is_rejected() {
        let app = build_router(test_state(|config| {
            config.webserver.trust_identity_header = true;
        }));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/hub")
                    .header("X-Relay-Identity", "not json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_untrusted_identity_header_is_ignored() {
        let app = build_router(test_state(|_| {}));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/hub")
                    .header("X-Relay-Identity", r#"{"user_id":"u1"}"#)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_trusted_identity_reaches_upgrade() {
        let app = build_router(test_state(|config| {
            config.webserver.trust_identity_header = true;
        }));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/hub")
                    .header("X-Relay-Identity", r#"{"user_id":"u1"}"#)
                    .header("connection", "upgrade")
                    .header("upgrade", "websocket")
                    .header("sec-websocket-version", "13")
                    .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        // Identity accepted; oneshot has no connection to upgrade
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    }
}

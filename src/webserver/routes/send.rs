/// Direct send endpoint
///
/// Lets in-network producers relay an envelope without going through the durable
/// queue. Disabled unless `webserver.internal_api_key` is set; callers present the key
/// in `X-Relay-Key`.
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::post,
    Router,
};
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::{
    errors::RelayError,
    logger::{self, LogTag},
    notifications::RelayOutcome,
    webserver::{
        state::AppState,
        utils::{error_response, success_response},
    },
};

pub const RELAY_KEY_HEADER: &str = "X-Relay-Key";

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SendResponse {
    Delivered { sends: usize, connections: usize },
    Skipped { reason: String },
    Unknown { push_type: i64 },
}

impl From<RelayOutcome> for SendResponse {
    fn from(outcome: RelayOutcome) -> Self {
        match outcome {
            RelayOutcome::Delivered { sends, connections } => {
                SendResponse::Delivered { sends, connections }
            }
            RelayOutcome::Skipped(skip) => SendResponse::Skipped {
                reason: skip.to_string(),
            },
            RelayOutcome::Unknown { code } => SendResponse::Unknown { push_type: code },
        }
    }
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/send", post(send_handler))
}

/// POST /send
async fn send_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let expected = state.config.internal_api_key.as_str();
    if expected.is_empty() {
        return error_response(
            StatusCode::NOT_FOUND,
            "SEND_DISABLED",
            "Direct sends are not enabled on this relay",
            None,
        );
    }

    let presented = headers
        .get(RELAY_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    if !relay_key_matches(presented, expected) {
        logger::warning(LogTag::Webserver, "Rejected /send with a missing or wrong relay key");
        return error_response(
            StatusCode::FORBIDDEN,
            "INVALID_RELAY_KEY",
            "A valid X-Relay-Key header is required",
            None,
        );
    }

    match state.relay.router.relay_raw(&body).await {
        Ok(outcome) => success_response(SendResponse::from(outcome)),
        Err(e @ RelayError::Decode { .. }) => error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_ENVELOPE",
            "Envelope could not be decoded",
            Some(&e.to_string()),
        ),
        Err(e) => {
            logger::error(LogTag::Webserver, &format!("Direct send failed: {}", e));
            error_response(
                StatusCode::BAD_GATEWAY,
                "RELAY_FAILED",
                "Envelope could not be relayed",
                Some(&e.to_string()),
            )
        }
    }
}

/// Constant-time key check
fn relay_key_matches(presented: Option<&str>, expected: &str) -> bool {
    match presented {
        Some(key) => bool::from(key.as_bytes().ct_eq(expected.as_bytes())),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::relay_key_matches;
    use crate::hub::{Identity, Principal};
    use crate::notifications::ClientType;
    use crate::webserver::build_router;
    use crate::webserver::server::tests::test_state;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    const ENVELOPE: &str = r#"{"Type":5,"Payload":{"UserId":"u1","Date":"2024-01-01T00:00:00Z"}}"#;

    fn send_request(key: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/send");
        if let Some(key) = key {
            builder = builder.header("X-Relay-Key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_send_disabled_without_key() {
        let app = build_router(test_state(|_| {}));
        let response = app.oneshot(send_request(Some("k"), ENVELOPE)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_send_rejects_wrong_key() {
        let app = build_router(test_state(|config| {
            config.webserver.internal_api_key = "secret".to_string();
        }));
        let response = app
            .clone()
            .oneshot(send_request(Some("wrong"), ENVELOPE))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.oneshot(send_request(None, ENVELOPE)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_send_relays_to_user_connection() {
        let state = test_state(|config| {
            config.webserver.internal_api_key = "secret".to_string();
        });
        let mut registration = state
            .relay
            .hub
            .register(&Principal::Authenticated(Identity::new(
                "u1",
                ClientType::Web,
                vec![],
            )))
            .unwrap();

        let app = build_router(state);
        let response = app
            .oneshot(send_request(Some("secret"), ENVELOPE))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["outcome"], "delivered");
        assert_eq!(json["connections"], 1);

        let frame = registration.receiver.try_recv().unwrap();
        let frame: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(frame["type"], "receive_message");
        assert_eq!(frame["data"]["Type"], 5);
    }

    #[tokio::test]
    async fn test_send_reports_bad_envelope_and_unknown_type() {
        let app = build_router(test_state(|config| {
            config.webserver.internal_api_key = "secret".to_string();
        }));

        let response = app
            .clone()
            .oneshot(send_request(Some("secret"), r#"{"Payload":{}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(send_request(Some("secret"), r#"{"Type":999,"Payload":{}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["outcome"], "unknown");
        assert_eq!(json["push_type"], 999);
    }

    #[test]
    fn test_relay_key_comparison() {
        assert!(relay_key_matches(Some("s3cret"), "s3cret"));
        assert!(!relay_key_matches(Some("s3cres"), "s3cret"));
        assert!(!relay_key_matches(Some("s3cret-longer"), "s3cret"));
        assert!(!relay_key_matches(Some(""), "s3cret"));
        assert!(!relay_key_matches(None, "s3cret"));
    }
}

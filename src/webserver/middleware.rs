/// Webserver middleware
///
/// Request interceptors that run before the route handlers
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::{
    arguments::is_debug_webserver_enabled,
    hub::Identity,
    logger::{self, LogTag},
    webserver::{state::AppState, utils},
};

/// Trusted identity gate
///
/// When the relay sits behind a gateway that has already authenticated the caller,
/// the gateway forwards the principal as JSON in the configured identity header.
/// The decoded `Identity` is inserted into the request extensions, where the `/hub`
/// handler picks it up. An identity already present in the extensions wins; the
/// header is ignored entirely unless `trust_identity_header` is set.
pub async fn trusted_identity(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.config.trust_identity_header || request.extensions().get::<Identity>().is_some() {
        return next.run(request).await;
    }

    let header = request
        .headers()
        .get(state.config.identity_header.as_str())
        .map(|value| value.to_str().map(str::to_string));

    match header {
        None => next.run(request).await,
        Some(Ok(value)) => match Identity::from_header_value(&value) {
            Ok(identity) => {
                if is_debug_webserver_enabled() {
                    logger::debug(
                        LogTag::Webserver,
                        &format!("Trusted identity for user {}", identity.user_id()),
                    );
                }
                request.extensions_mut().insert(identity);
                next.run(request).await
            }
            Err(e) => {
                logger::warning(
                    LogTag::Webserver,
                    &format!("Rejected request to {}: {}", request.uri().path(), e),
                );
                utils::error_response(
                    StatusCode::BAD_REQUEST,
                    "INVALID_IDENTITY",
                    "Identity header could not be decoded",
                    Some(&e.to_string()),
                )
            }
        },
        Some(Err(_)) => utils::error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_IDENTITY",
            "Identity header is not valid UTF-8",
            None,
        ),
    }
}

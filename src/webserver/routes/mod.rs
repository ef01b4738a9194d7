use crate::webserver::{middleware, state::AppState};
use axum::Router;
use std::sync::Arc;

pub mod hub;
pub mod send;
pub mod status;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(hub::routes())
        .merge(send::routes())
        .merge(status::routes())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::trusted_identity,
        ))
        .with_state(state)
}

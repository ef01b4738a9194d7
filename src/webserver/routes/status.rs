use axum::{extract::State, response::Response, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    arguments::is_debug_webserver_enabled,
    hub::HubMetricsSnapshot,
    logger::{self, LogTag},
    queue::ConsumerStatsSnapshot,
    webserver::{state::AppState, utils::success_response},
};

#[derive(Debug, Clone, Serialize)]
pub struct AliveResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HubStatus {
    pub connections: usize,
    pub metrics: HubMetricsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub active_connections: usize,
    pub hub: HubStatus,
    pub anonymous_hub: HubStatus,
    /// Present only when a durable queue is configured
    pub queue: Option<ConsumerStatsSnapshot>,
    pub backplane: Option<String>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/alive", get(alive))
        .route("/status", get(status))
}

/// GET /alive
async fn alive() -> Response {
    success_response(AliveResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status
async fn status(State(state): State<Arc<AppState>>) -> Response {
    let relay = &state.relay;

    let response = StatusResponse {
        timestamp: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        active_connections: relay.counter.get(),
        hub: HubStatus {
            connections: relay.hub.connection_count(),
            metrics: relay.hub.metrics().snapshot(),
        },
        anonymous_hub: HubStatus {
            connections: relay.anonymous_hub.connection_count(),
            metrics: relay.anonymous_hub.metrics().snapshot(),
        },
        queue: relay
            .queue
            .as_ref()
            .map(|_| relay.consumer_stats.snapshot()),
        backplane: relay
            .backplane
            .as_ref()
            .map(|backplane| format!("{}:{}", backplane.name(), backplane.channel())),
    };

    if is_debug_webserver_enabled() {
        logger::debug(
            LogTag::Webserver,
            &format!(
                "Status snapshot ready (uptime={}s, active_connections={})",
                response.uptime_seconds, response.active_connections
            ),
        );
    }

    success_response(response)
}

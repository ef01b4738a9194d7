//! WebSocket connection lifecycle: the per-connection task and its health tracking

pub mod connection;
pub mod health;

pub use connection::handle_connection;
pub use health::{ConnectionHealth, HealthConfig};

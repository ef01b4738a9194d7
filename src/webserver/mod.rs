//! HTTP and WebSocket surface of the relay

mod server;

pub mod middleware;
pub mod routes;
pub mod state;
pub mod utils;
pub mod ws;

pub use server::{bind_listener, build_router, serve};

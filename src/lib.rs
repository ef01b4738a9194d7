pub mod arguments;
pub mod backplane;
pub mod config;
pub mod errors;
pub mod heartbeat;
pub mod hub;
pub mod logger;
pub mod notifications;
pub mod queue;
pub mod relay;
pub mod run;
pub mod services;
#[cfg(feature = "web")]
pub mod webserver;

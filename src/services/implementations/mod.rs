mod backplane_service;
mod heartbeat_service;
mod queue_consumer_service;
#[cfg(feature = "web")]
mod webserver_service;

pub use backplane_service::BackplaneService;
pub use heartbeat_service::HeartbeatService;
pub use queue_consumer_service::QueueConsumerService;
#[cfg(feature = "web")]
pub use webserver_service::WebserverService;

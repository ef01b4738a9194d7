/// Relay assembly
///
/// Builds hubs, router, optional backplane and optional queue from a `Config` and
/// hands the shared pieces to services and the webserver.
use crate::backplane::{self, Backplane};
use crate::config::Config;
use crate::errors::RelayResult;
use crate::hub::{global_counter, ConnectionCounter, ConnectionRegistry, Hub, HubOptions};
use crate::notifications::NotificationRouter;
use crate::queue::{self, ConsumerOptions, ConsumerStats, NotificationQueue, QueueConsumer};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct Relay {
    pub config: Config,
    pub hub: Arc<Hub>,
    pub anonymous_hub: Arc<Hub>,
    pub router: NotificationRouter,
    pub backplane: Option<Arc<dyn Backplane>>,
    pub queue: Option<Arc<dyn NotificationQueue>>,
    pub counter: Arc<ConnectionCounter>,
    pub consumer_stats: Arc<ConsumerStats>,
    pub started_at: DateTime<Utc>,
}

/// Overrides for pieces normally built from configuration
#[derive(Default)]
pub struct RelayBuilder {
    backplane: Option<Option<Arc<dyn Backplane>>>,
    queue: Option<Option<Arc<dyn NotificationQueue>>>,
    counter: Option<Arc<ConnectionCounter>>,
}

impl RelayBuilder {
    pub fn backplane(mut self, backplane: Option<Arc<dyn Backplane>>) -> Self {
        self.backplane = Some(backplane);
        self
    }

    pub fn queue(mut self, queue: Option<Arc<dyn NotificationQueue>>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn counter(mut self, counter: Arc<ConnectionCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn build(self, config: Config) -> RelayResult<Arc<Relay>> {
        let backplane = match self.backplane {
            Some(backplane) => backplane,
            None => backplane::from_config(&config.backplane)?,
        };
        let queue = match self.queue {
            Some(queue) => queue,
            None => queue::from_config(&config.queue)?,
        };
        let counter = self.counter.unwrap_or_else(global_counter);

        let options = HubOptions {
            buffer_size: config.webserver.client_buffer_size,
            counter: counter.clone(),
            backplane: backplane.clone(),
        };
        let hub = Hub::authenticated(config.installation.installation_id(), options.clone());
        let anonymous_hub = Hub::anonymous(options);

        let router = NotificationRouter::new(
            hub.clone() as Arc<dyn ConnectionRegistry>,
            anonymous_hub.clone() as Arc<dyn ConnectionRegistry>,
        );

        Ok(Arc::new(Relay {
            config,
            hub,
            anonymous_hub,
            router,
            backplane,
            queue,
            counter,
            consumer_stats: Arc::new(ConsumerStats::default()),
            started_at: Utc::now(),
        }))
    }
}

impl Relay {
    pub fn builder() -> RelayBuilder {
        RelayBuilder::default()
    }

    /// Build everything from configuration alone
    pub fn from_config(config: Config) -> RelayResult<Arc<Self>> {
        Self::builder().build(config)
    }

    pub fn hubs(&self) -> Vec<Arc<Hub>> {
        vec![self.hub.clone(), self.anonymous_hub.clone()]
    }

    pub fn registries(&self) -> Vec<Arc<dyn ConnectionRegistry>> {
        vec![
            self.hub.clone() as Arc<dyn ConnectionRegistry>,
            self.anonymous_hub.clone() as Arc<dyn ConnectionRegistry>,
        ]
    }

    /// Consumer for the configured queue, sharing this relay's stats
    pub fn consumer(&self) -> Option<QueueConsumer> {
        self.queue.as_ref().map(|queue| {
            QueueConsumer::new(
                queue.clone(),
                self.router.clone(),
                ConsumerOptions::from(&self.config.queue),
            )
            .with_stats(self.consumer_stats.clone())
        })
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }
}

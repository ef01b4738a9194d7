mod health;
pub mod implementations;

pub use health::ServiceHealth;

use crate::config::Config;
use crate::errors::{RelayError, RelayResult};
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Core service trait that all relay services implement
#[async_trait]
pub trait Service: Send + Sync {
    /// Unique service identifier
    fn name(&self) -> &'static str;

    /// Lower starts earlier and stops later
    fn priority(&self) -> i32 {
        100
    }

    /// Services that must be started first (ignored when not enabled)
    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }

    fn is_enabled(&self, _config: &Config) -> bool {
        true
    }

    async fn initialize(&mut self) -> RelayResult<()> {
        Ok(())
    }

    /// Spawn the service's tasks; they must exit once `shutdown` is cancelled
    async fn start(&mut self, shutdown: CancellationToken) -> RelayResult<Vec<JoinHandle<()>>>;

    async fn stop(&mut self) -> RelayResult<()> {
        Ok(())
    }

    async fn health(&self) -> ServiceHealth {
        ServiceHealth::Healthy
    }
}

pub struct ServiceManager {
    services: HashMap<&'static str, Box<dyn Service>>,
    handles: HashMap<&'static str, Vec<JoinHandle<()>>>,
    started: Vec<&'static str>,
    shutdown: CancellationToken,
    config: Config,
    shutdown_timeout: Duration,
}

impl ServiceManager {
    pub fn new(config: Config) -> Self {
        let shutdown_timeout = Duration::from_secs(config.services.shutdown_timeout_secs);
        Self {
            services: HashMap::new(),
            handles: HashMap::new(),
            started: Vec::new(),
            shutdown: CancellationToken::new(),
            config,
            shutdown_timeout,
        }
    }

    pub fn register(&mut self, service: Box<dyn Service>) {
        let name = service.name();
        self.services.insert(name, service);
    }

    /// Token cancelled by `stop_all`
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start all enabled services in dependency and priority order.
    ///
    /// A failing service aborts startup; services already running keep running
    /// until `stop_all`.
    pub async fn start_all(&mut self) -> RelayResult<()> {
        logger::info(LogTag::System, "Starting all services...");

        let enabled: Vec<&'static str> = self
            .services
            .iter()
            .filter(|(_, service)| service.is_enabled(&self.config))
            .map(|(name, _)| *name)
            .collect();

        let ordered = self.resolve_startup_order(&enabled)?;
        logger::info(
            LogTag::System,
            &format!("Service startup order: {:?}", ordered),
        );

        for service_name in ordered {
            let Some(service) = self.services.get_mut(service_name) else {
                continue;
            };

            logger::debug(LogTag::System, &format!("Initializing service: {}", service_name));
            service.initialize().await?;

            let handles = service.start(self.shutdown.child_token()).await?;
            self.handles.insert(service_name, handles);
            self.started.push(service_name);

            logger::info(LogTag::System, &format!("Service started: {}", service_name));
        }

        logger::info(LogTag::System, "All services started");
        Ok(())
    }

    /// Cancel all services and stop them in reverse startup order, waiting up to the
    /// shutdown timeout for each service's tasks
    pub async fn stop_all(&mut self) -> RelayResult<()> {
        logger::info(LogTag::System, "Stopping all services...");
        self.shutdown.cancel();

        let ordered: Vec<&'static str> = self.started.drain(..).rev().collect();

        for service_name in ordered {
            if let Some(service) = self.services.get_mut(service_name) {
                if let Err(e) = service.stop().await {
                    logger::warning(
                        LogTag::System,
                        &format!("Service stop error for {}: {}", service_name, e),
                    );
                }
            }

            if let Some(handles) = self.handles.remove(service_name) {
                for mut handle in handles {
                    if tokio::time::timeout(self.shutdown_timeout, &mut handle)
                        .await
                        .is_err()
                    {
                        logger::warning(
                            LogTag::System,
                            &format!(
                                "Service {} did not stop within {}s, aborting task",
                                service_name,
                                self.shutdown_timeout.as_secs()
                            ),
                        );
                        handle.abort();
                    }
                }
            }

            logger::info(LogTag::System, &format!("Service stopped: {}", service_name));
        }

        logger::info(LogTag::System, "All services stopped");
        Ok(())
    }

    /// Dependency-respecting order, visiting services by priority.
    /// Dependencies that are not enabled are skipped.
    fn resolve_startup_order(
        &self,
        services: &[&'static str],
    ) -> RelayResult<Vec<&'static str>> {
        let enabled: HashSet<&'static str> = services.iter().copied().collect();
        let mut by_priority: Vec<&'static str> = services.to_vec();
        by_priority.sort_by_key(|name| {
            (
                self.services.get(name).map(|s| s.priority()).unwrap_or(100),
                *name,
            )
        });

        let mut ordered = Vec::new();
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();

        fn visit(
            name: &'static str,
            services: &HashMap<&'static str, Box<dyn Service>>,
            enabled: &HashSet<&'static str>,
            ordered: &mut Vec<&'static str>,
            visited: &mut HashSet<&'static str>,
            visiting: &mut HashSet<&'static str>,
        ) -> RelayResult<()> {
            if visited.contains(name) {
                return Ok(());
            }
            if !visiting.insert(name) {
                return Err(RelayError::service(
                    name,
                    "circular dependency detected",
                ));
            }

            if let Some(service) = services.get(name) {
                for dep in service.dependencies() {
                    if enabled.contains(dep) {
                        visit(dep, services, enabled, ordered, visited, visiting)?;
                    }
                }
            }

            visiting.remove(name);
            visited.insert(name);
            ordered.push(name);
            Ok(())
        }

        for name in by_priority {
            visit(
                name,
                &self.services,
                &enabled,
                &mut ordered,
                &mut visited,
                &mut visiting,
            )?;
        }

        Ok(ordered)
    }

    pub async fn get_health(&self) -> HashMap<&'static str, ServiceHealth> {
        let mut health = HashMap::new();
        for (name, service) in &self.services {
            health.insert(*name, service.health().await);
        }
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct TestService {
        name: &'static str,
        priority: i32,
        deps: Vec<&'static str>,
        enabled: bool,
        log: Arc<Mutex<Vec<String>>>,
        ignore_cancel: bool,
    }

    impl TestService {
        fn new(name: &'static str, priority: i32, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                priority,
                deps: vec![],
                enabled: true,
                log: log.clone(),
                ignore_cancel: false,
            }
        }
    }

    #[async_trait]
    impl Service for TestService {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn dependencies(&self) -> Vec<&'static str> {
            self.deps.clone()
        }

        fn is_enabled(&self, _config: &Config) -> bool {
            self.enabled
        }

        async fn start(&mut self, shutdown: CancellationToken) -> RelayResult<Vec<JoinHandle<()>>> {
            self.log.lock().push(format!("start:{}", self.name));
            let ignore_cancel = self.ignore_cancel;
            Ok(vec![tokio::spawn(async move {
                if ignore_cancel {
                    std::future::pending::<()>().await;
                }
                shutdown.cancelled().await;
            })])
        }

        async fn stop(&mut self) -> RelayResult<()> {
            self.log.lock().push(format!("stop:{}", self.name));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dependency_and_priority_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ServiceManager::new(Config::default());

        let mut consumer = TestService::new("consumer", 10, &log);
        consumer.deps = vec!["backplane"];
        let mut disabled = TestService::new("disabled", 1, &log);
        disabled.enabled = false;
        let mut webserver = TestService::new("webserver", 20, &log);
        webserver.deps = vec!["disabled"];

        manager.register(Box::new(consumer));
        manager.register(Box::new(TestService::new("backplane", 50, &log)));
        manager.register(Box::new(disabled));
        manager.register(Box::new(webserver));

        manager.start_all().await.unwrap();
        manager.stop_all().await.unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "start:backplane",
                "start:consumer",
                "start:webserver",
                "stop:webserver",
                "stop:consumer",
                "stop:backplane",
            ]
        );
    }

    #[tokio::test]
    async fn test_circular_dependency_is_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ServiceManager::new(Config::default());
        let mut a = TestService::new("a", 1, &log);
        a.deps = vec!["b"];
        let mut b = TestService::new("b", 2, &log);
        b.deps = vec!["a"];
        manager.register(Box::new(a));
        manager.register(Box::new(b));

        assert!(matches!(
            manager.start_all().await,
            Err(RelayError::Service { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_task_is_aborted_after_timeout() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut config = Config::default();
        config.services.shutdown_timeout_secs = 2;
        let mut manager = ServiceManager::new(config);

        let mut stuck = TestService::new("stuck", 1, &log);
        stuck.ignore_cancel = true;
        manager.register(Box::new(stuck));

        manager.start_all().await.unwrap();
        let started = tokio::time::Instant::now();
        manager.stop_all().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(log.lock().last().map(String::as_str), Some("stop:stuck"));
    }
}

//! Periodic driver for synchronization ticks
//!
//! Each round first runs discovery for the watched registries, then starts
//! one tick per registered service on its own task. A semaphore bounds how
//! many ticks run at once. Rounds may overlap; ticks of a service still in
//! flight from an earlier round are skipped.

use aas_sync_core::{AccessUrl, PipelineFailure, PipelineResult};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::SecretStore;
use crate::auth::AuthenticationMethod;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::registry::Service;
use crate::sync::discovery::RegistryDiscovery;
use crate::sync::synchronizer::{ServiceSynchronizer, TickOutcome};

/// A registry watched for service discovery
struct WatchedRegistry {
    url: AccessUrl,
    auth: Arc<AuthenticationMethod>,
}

/// Drives synchronization rounds over all registered services
pub struct SyncScheduler {
    synchronizer: Arc<ServiceSynchronizer>,
    discovery: Option<RegistryDiscovery>,
    registries: Vec<WatchedRegistry>,
    period: Duration,
    permits: Arc<Semaphore>,
}

impl SyncScheduler {
    pub fn new(synchronizer: Arc<ServiceSynchronizer>, config: &SyncConfig) -> Self {
        Self {
            synchronizer,
            discovery: None,
            registries: Vec::new(),
            period: config.sync_period(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_ticks)),
        }
    }

    /// Enable discovery through watched registries
    pub fn with_discovery(mut self, discovery: RegistryDiscovery) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Discover services advertised by `url` at the start of every round
    pub fn watch_registry(mut self, url: AccessUrl, auth: AuthenticationMethod) -> Self {
        self.registries.push(WatchedRegistry {
            url,
            auth: Arc::new(auth),
        });
        self
    }

    /// Register the services and watch the registries listed in `config`.
    ///
    /// Configured services are picked up by the next round, not ticked
    /// immediately. Vault authentication needs `secrets`.
    pub async fn with_endpoints(
        mut self,
        config: &SyncConfig,
        secrets: Option<Arc<dyn SecretStore>>,
    ) -> SyncResult<Self> {
        for endpoint in &config.services {
            let auth = endpoint.authentication(secrets.clone())?;
            if !self
                .synchronizer
                .register(Service::new(endpoint.url.clone()).with_auth(auth))
                .await
            {
                debug!(service = %endpoint.url, "Configured service already registered");
            }
        }
        for endpoint in &config.registries {
            let auth = endpoint.authentication(secrets.clone())?;
            self = self.watch_registry(endpoint.url.clone(), auth);
        }
        Ok(self)
    }

    pub fn synchronizer(&self) -> &Arc<ServiceSynchronizer> {
        &self.synchronizer
    }

    /// Register a service and, if it is new, synchronize it right away.
    ///
    /// Returns `None` when the service was already registered.
    #[instrument(skip(self, service), fields(service = %service.access_url()))]
    pub async fn register(&self, service: Service) -> Option<TickOutcome> {
        let url = service.access_url().clone();
        if !self.synchronizer.register(service).await {
            debug!("Service already known, no immediate tick");
            return None;
        }
        Some(self.tick(url).await)
    }

    /// One round: discovery, then one tick per registered service.
    ///
    /// Returns the outcome of every tick, ordered by access URL.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Vec<(AccessUrl, TickOutcome)> {
        if let Some(discovery) = &self.discovery {
            for watched in &self.registries {
                if let Err(e) = discovery.discover(&watched.url, watched.auth.clone()).await {
                    warn!(registry = %watched.url, error = %e, "Discovery failed");
                }
            }
        }

        let services = self.synchronizer.registry().get_all().await;
        debug!(services = services.len(), "Starting synchronization round");

        let ticks = services
            .into_iter()
            .map(|service| service.access_url().clone())
            .map(|url| async move {
                let outcome = self.tick(url.clone()).await;
                (url, outcome)
            });
        join_all(ticks).await
    }

    /// Run one tick for `url` on its own task, bounded by the permits.
    ///
    /// The in-flight marker is taken before waiting for a permit, so a tick
    /// of a service that is still running is skipped rather than queued.
    async fn tick(&self, url: AccessUrl) -> TickOutcome {
        let Some(guard) = self.synchronizer.registry().try_begin_tick(&url) else {
            debug!(service = %url, "Tick already in flight, skipping");
            return TickOutcome::Skipped;
        };
        let synchronizer = self.synchronizer.clone();
        let permits = self.permits.clone();

        let handle = tokio::spawn(async move {
            // The semaphore is never closed
            let _permit = permits.acquire_owned().await.ok();
            synchronizer.run_tick(guard).await
        });

        match handle.await {
            Ok(result) => TickOutcome::Completed(result),
            Err(e) => {
                error!(service = %url, error = %e, "Tick task panicked");
                TickOutcome::Completed(PipelineResult::fatal(PipelineFailure::fatal(format!(
                    "tick task failed: {}",
                    e
                ))))
            }
        }
    }

    /// Start periodic rounds on a background task
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let scheduler = Arc::clone(&self);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(period_secs = scheduler.period.as_secs(), "Synchronization scheduler started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let round = scheduler.clone();
                        tokio::spawn(async move {
                            round.run_once().await;
                        });
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Synchronization scheduler stopped");
        });

        SchedulerHandle { shutdown, task }
    }
}

/// Handle to a running scheduler
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop starting new rounds and wait for the scheduler loop to exit.
    ///
    /// Rounds already started run to completion (each tick is bounded by the
    /// tick timeout).
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
    }
}

//! Per-service synchronization
//!
//! The [`ServiceSynchronizer`] runs one tick for one service at a time:
//! fetch, diff against the registry, swap the registry snapshot and emit the
//! change set to the catalog. Ticks for the same service never overlap; a
//! tick that finds its service in flight is skipped.

use aas_sync_core::{
    removal_of, AccessUrl, FailureSink, Pipeline, PipelineFailure, PipelineResult,
    ServiceChangeSet, TracingFailureSink,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{CatalogApplier, ServiceClient};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::registry::{RegistryError, Service, ServiceRegistry, TickGuard};
use crate::sync::steps::{DiffSnapshots, EmitChanges, FetchSnapshot, RestrictKinds, SwapSnapshot};

/// Result of one tick's pipeline: the change set that was emitted, if any
pub type TickResult = PipelineResult<Option<ServiceChangeSet>>;

/// What happened when a tick was requested
#[derive(Debug)]
pub enum TickOutcome {
    /// Another tick for the service was in flight; nothing was done
    Skipped,
    /// The tick ran (possibly failing)
    Completed(TickResult),
}

impl TickOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TickOutcome::Skipped)
    }

    pub fn result(&self) -> Option<&TickResult> {
        match self {
            TickOutcome::Skipped => None,
            TickOutcome::Completed(result) => Some(result),
        }
    }

    /// The change set produced by a completed tick
    pub fn changes(&self) -> Option<&ServiceChangeSet> {
        self.result()
            .and_then(|result| result.content())
            .and_then(|changes| changes.as_ref())
    }
}

/// Synchronizes registered services into the catalog
pub struct ServiceSynchronizer {
    registry: Arc<ServiceRegistry>,
    catalog: Arc<dyn CatalogApplier>,
    pipeline: Pipeline<Service, Option<ServiceChangeSet>>,
    tick_timeout: Duration,
}

impl ServiceSynchronizer {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        client: Arc<dyn ServiceClient>,
        catalog: Arc<dyn CatalogApplier>,
        config: &SyncConfig,
    ) -> Self {
        Self::with_failure_sink(registry, client, catalog, config, Arc::new(TracingFailureSink))
    }

    /// Like [`ServiceSynchronizer::new`], reporting tick failures to `sink`
    pub fn with_failure_sink(
        registry: Arc<ServiceRegistry>,
        client: Arc<dyn ServiceClient>,
        catalog: Arc<dyn CatalogApplier>,
        config: &SyncConfig,
        sink: Arc<dyn FailureSink>,
    ) -> Self {
        let mut fetch = Pipeline::<Service, Service>::builder("service-sync")
            .failure_sink(sink)
            .step(FetchSnapshot::new(client));
        if config.only_submodels {
            fetch = fetch.step(RestrictKinds::submodels_only());
        }
        let pipeline = fetch
            .step(DiffSnapshots::new(registry.clone()))
            .step(SwapSnapshot::new(registry.clone()))
            .step(EmitChanges::new(catalog.clone()))
            .build();

        Self {
            registry,
            catalog,
            pipeline,
            tick_timeout: config.tick_timeout(),
        }
    }

    /// Override the tick timeout from the configuration
    pub fn with_tick_timeout(mut self, timeout: Duration) -> Self {
        self.tick_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Register a service; `false` if its URL is already known
    pub async fn register(&self, service: Service) -> bool {
        self.registry.put(service).await
    }

    /// Run one tick for the service at `url`.
    ///
    /// Returns [`TickOutcome::Skipped`] without touching anything when a tick
    /// for the same service is already running. A tick that exceeds the
    /// timeout is abandoned and reported as a recoverable failure.
    #[instrument(skip(self, url), fields(service = %url))]
    pub async fn synchronize(&self, url: &AccessUrl) -> TickOutcome {
        let Some(guard) = self.registry.try_begin_tick(url) else {
            debug!("Tick already in flight, skipping");
            return TickOutcome::Skipped;
        };
        TickOutcome::Completed(self.run_tick(guard).await)
    }

    /// Run one tick for the service whose in-flight marker `guard` holds.
    ///
    /// The marker is released when the tick ends. Callers that queue ticks
    /// take the guard before queueing, so a tick is never started while
    /// another one for the same service is running.
    #[instrument(skip(self, guard), fields(service = %guard.url()))]
    pub async fn run_tick(&self, guard: TickGuard) -> TickResult {
        let url = guard.url();
        let Some(service) = self.registry.get(url).await else {
            let failure = SyncError::from(RegistryError::NotRegistered(url.clone())).to_failure();
            return PipelineResult::recoverable(None, failure);
        };

        let result = match tokio::time::timeout(self.tick_timeout, self.pipeline.execute(service)).await {
            Ok(result) => result,
            Err(_) => PipelineResult::recoverable(
                None,
                PipelineFailure::warning(format!(
                    "tick abandoned after {}ms",
                    self.tick_timeout.as_millis()
                )),
            ),
        };

        match &result {
            PipelineResult::Success(changes) => debug!(
                changes = changes.as_ref().map(|c| c.len()).unwrap_or(0),
                "Tick completed"
            ),
            PipelineResult::RecoverableFailure { failures, .. } => {
                warn!(failures = failures.len(), "Tick completed with failures")
            }
            PipelineResult::FatalFailure { failures } => {
                let reasons: Vec<String> = failures.iter().map(ToString::to_string).collect();
                error!(reasons = ?reasons, "Tick failed");
            }
        }

        result
    }

    /// Unregister a service and remove everything it contributed to the
    /// catalog.
    ///
    /// Waits for an in-flight tick of the service to finish first, so the
    /// cleanup cannot race with that tick's emission.
    #[instrument(skip(self, url), fields(service = %url))]
    pub async fn unregister(&self, url: &AccessUrl) -> TickResult {
        let _guard = self.registry.begin_tick(url).await;

        let Some(service) = self.registry.remove(url).await else {
            let failure = SyncError::from(RegistryError::NotRegistered(url.clone())).to_failure();
            return PipelineResult::recoverable(None, failure);
        };

        let cleanup = service
            .snapshot()
            .map(|snapshot| removal_of(snapshot.as_ref()))
            .unwrap_or_default();
        if cleanup.is_empty() {
            info!("Service unregistered, nothing to clean up");
            return PipelineResult::success(Some(cleanup));
        }

        match self.catalog.apply(url, cleanup.clone()).await {
            Ok(()) => {
                info!(removals = cleanup.len(), "Service unregistered and catalog cleaned up");
                PipelineResult::success(Some(cleanup))
            }
            Err(e) => {
                let failure = SyncError::from(e).to_failure();
                warn!(reason = %failure, "Catalog cleanup failed");
                PipelineResult::recoverable(Some(Some(cleanup)), failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::catalog::MockCatalogApplier;
    use crate::adapters::service_client::MockServiceClient;
    use crate::adapters::{ApplyError, InMemoryCatalog};
    use aas_sync_core::{Resource, ResourceGraph, ResourceKind};
    use serde_json::json;

    fn svc() -> AccessUrl {
        AccessUrl::parse("https://svc:8443").unwrap()
    }

    fn graph(ids: &[&str]) -> ResourceGraph {
        ResourceGraph::new(
            ids.iter()
                .map(|id| Resource::root(ResourceKind::Submodel, *id, json!({})))
                .collect(),
        )
    }

    fn synchronizer(client: MockServiceClient, catalog: Arc<dyn CatalogApplier>) -> ServiceSynchronizer {
        ServiceSynchronizer::new(
            Arc::new(ServiceRegistry::new()),
            Arc::new(client),
            catalog,
            &SyncConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_tick_for_unknown_service_is_recoverable() {
        let mut client = MockServiceClient::new();
        client.expect_fetch_snapshot().never();
        let sync = synchronizer(client, Arc::new(InMemoryCatalog::new()));

        let outcome = sync.synchronize(&svc()).await;
        assert!(outcome.result().unwrap().is_recoverable());
    }

    #[tokio::test]
    async fn test_tick_skipped_while_in_flight() {
        let mut client = MockServiceClient::new();
        client.expect_fetch_snapshot().never();
        let sync = synchronizer(client, Arc::new(InMemoryCatalog::new()));
        sync.register(Service::new(svc())).await;

        let _in_flight = sync.registry().try_begin_tick(&svc()).unwrap();
        let outcome = sync.synchronize(&svc()).await;

        assert!(outcome.is_skipped());
        assert!(outcome.changes().is_none());
        assert!(sync.registry().get(&svc()).await.unwrap().snapshot().is_none());
    }

    #[tokio::test]
    async fn test_only_submodels_restricts_snapshot() {
        let mut client = MockServiceClient::new();
        client.expect_fetch_snapshot().returning(|_, _| {
            Ok(ResourceGraph::new(vec![
                Resource::root(ResourceKind::Shell, "aas", json!({})),
                Resource::root(ResourceKind::Submodel, "sm", json!({})),
            ]))
        });

        let config = SyncConfig::default().with_only_submodels(true);
        let sync = ServiceSynchronizer::new(
            Arc::new(ServiceRegistry::new()),
            Arc::new(client),
            Arc::new(InMemoryCatalog::new()),
            &config,
        );
        sync.register(Service::new(svc())).await;

        let outcome = sync.synchronize(&svc()).await;
        let changes = outcome.changes().unwrap();
        assert_eq!(changes.to_add().len(), 1);
        assert_eq!(changes.to_add()[0].reference.kind(), ResourceKind::Submodel);
    }

    #[tokio::test]
    async fn test_catalog_failure_keeps_registry_snapshot() {
        let mut client = MockServiceClient::new();
        client.expect_fetch_snapshot().returning(|_, _| Ok(graph(&["A"])));
        let mut catalog = MockCatalogApplier::new();
        catalog
            .expect_apply()
            .returning(|_, _| Err(ApplyError::Rejected("read-only".into())));

        let sync = synchronizer(client, Arc::new(catalog));
        sync.register(Service::new(svc())).await;

        let outcome = sync.synchronize(&svc()).await;
        assert!(outcome.result().unwrap().is_recoverable());
        assert_eq!(outcome.changes().unwrap().to_add().len(), 1);

        let service = sync.registry().get(&svc()).await.unwrap();
        assert_eq!(service.snapshot().unwrap().roots().len(), 1);
        assert!(!sync.registry().is_in_flight(&svc()));
    }

    #[tokio::test]
    async fn test_unregister_emits_cleanup() {
        let mut client = MockServiceClient::new();
        client.expect_fetch_snapshot().returning(|_, _| Ok(graph(&["A", "B"])));
        let catalog = Arc::new(InMemoryCatalog::new());

        let sync = synchronizer(client, catalog.clone());
        sync.register(Service::new(svc())).await;
        sync.synchronize(&svc()).await;
        assert_eq!(catalog.references(&svc()).await.len(), 2);

        let result = sync.unregister(&svc()).await;
        assert!(result.is_success());
        assert_eq!(result.content().unwrap().as_ref().unwrap().to_remove().len(), 2);
        assert!(catalog.references(&svc()).await.is_empty());
        assert!(sync.registry().get(&svc()).await.is_none());

        assert!(sync.unregister(&svc()).await.is_recoverable());
    }

    #[tokio::test]
    async fn test_unregister_never_synced_service() {
        let mut catalog = MockCatalogApplier::new();
        catalog.expect_apply().never();
        let sync = synchronizer(MockServiceClient::new(), Arc::new(catalog));
        sync.register(Service::new(svc())).await;

        let result = sync.unregister(&svc()).await;
        assert!(result.is_success());
        assert!(result.into_content().flatten().unwrap().is_empty());
    }
}

//! End-to-end synchronization scenarios
//!
//! These tests drive the synchronizer with hand-written collaborators: a
//! scripted service client and a recording catalog.

use aas_sync_core::{AccessUrl, Resource, ResourceGraph, ResourceKind, ServiceChangeSet};
use aas_sync_service::adapters::{
    ApplyError, ApplyResult, CatalogApplier, FetchError, FetchResult, Headers, InMemoryCatalog,
    InMemorySecretStore, ServiceClient,
};
use aas_sync_service::{
    AuthenticationMethod, Service, ServiceRegistry, ServiceSynchronizer, SyncConfig, TickOutcome,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

// ============================================================================
// Fakes
// ============================================================================

/// Serves queued responses and records the headers of every call
#[derive(Default)]
struct ScriptedClient {
    responses: Mutex<VecDeque<FetchResult<ResourceGraph>>>,
    headers: Mutex<Vec<Headers>>,
    calls: AtomicUsize,
    /// (entered, release): signal entry, then wait for a release permit
    gate: Option<(Arc<Notify>, Arc<Semaphore>)>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedClient {
    fn new() -> Self {
        Self::default()
    }

    fn gated(entered: Arc<Notify>, release: Arc<Semaphore>) -> Self {
        Self {
            gate: Some((entered, release)),
            ..Default::default()
        }
    }

    fn respond(&self, response: FetchResult<ResourceGraph>) {
        self.responses.lock().unwrap().push_back(response);
    }

    fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_headers(&self) -> Option<Headers> {
        self.headers.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ServiceClient for ScriptedClient {
    async fn fetch_snapshot(&self, _url: &AccessUrl, headers: &Headers) -> FetchResult<ResourceGraph> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.headers.lock().unwrap().push(headers.clone());

        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            if let Ok(permit) = release.acquire().await {
                permit.forget();
            }
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(ResourceGraph::empty()))
    }
}

/// Records every change set and can be switched to reject them
#[derive(Default)]
struct RecordingCatalog {
    applied: Mutex<Vec<ServiceChangeSet>>,
    failing: AtomicBool,
}

impl RecordingCatalog {
    fn applied(&self) -> Vec<ServiceChangeSet> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogApplier for RecordingCatalog {
    async fn apply(&self, _service: &AccessUrl, changes: ServiceChangeSet) -> ApplyResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApplyError::Unavailable("catalog offline".to_string()));
        }
        self.applied.lock().unwrap().push(changes);
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn svc() -> AccessUrl {
    AccessUrl::parse("https://svc:8443").unwrap()
}

fn submodels(ids: &[&str]) -> ResourceGraph {
    ResourceGraph::new(
        ids.iter()
            .map(|id| Resource::root(ResourceKind::Submodel, *id, json!({ "idShort": id })))
            .collect(),
    )
}

fn added(changes: &ServiceChangeSet) -> Vec<String> {
    changes.to_add().iter().map(|e| e.reference.id().to_string()).collect()
}

fn removed(changes: &ServiceChangeSet) -> Vec<String> {
    changes.to_remove().iter().map(|r| r.id().to_string()).collect()
}

fn synchronizer(
    client: Arc<dyn ServiceClient>,
    catalog: Arc<dyn CatalogApplier>,
) -> ServiceSynchronizer {
    ServiceSynchronizer::new(
        Arc::new(ServiceRegistry::new()),
        client,
        catalog,
        &SyncConfig::default(),
    )
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_basic_auth_service_two_ticks() {
    let client = Arc::new(ScriptedClient::new());
    let catalog = Arc::new(RecordingCatalog::default());
    let sync = synchronizer(client.clone(), catalog.clone());

    assert!(sync.registry().is_empty().await);
    let service = Service::new(svc()).with_auth(AuthenticationMethod::basic("u", "p"));
    assert!(sync.register(service).await);

    // First tick: everything is new
    client.respond(Ok(submodels(&["A", "B"])));
    let outcome = sync.synchronize(&svc()).await;
    let changes = outcome.changes().unwrap();
    assert!(outcome.result().unwrap().is_success());
    assert_eq!(added(changes), vec!["A", "B"]);
    assert!(removed(changes).is_empty());

    let headers = client.last_headers().unwrap();
    assert_eq!(STANDARD.encode("u:p"), "dTpw");
    assert_eq!(headers.get("Authorization").map(String::as_str), Some("Basic dTpw"));

    // Second tick: B disappeared, C appeared
    client.respond(Ok(submodels(&["A", "C"])));
    let outcome = sync.synchronize(&svc()).await;
    let changes = outcome.changes().unwrap();
    assert_eq!(added(changes), vec!["C"]);
    assert_eq!(removed(changes), vec!["B"]);

    assert_eq!(catalog.applied().len(), 2);
    let stored = sync.registry().get(&svc()).await.unwrap();
    assert!(stored.last_synced().is_some());
    assert_eq!(stored.snapshot().unwrap().roots().len(), 2);
}

#[tokio::test]
async fn test_concurrent_tick_is_skipped() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Semaphore::new(0));
    let client = Arc::new(ScriptedClient::gated(entered.clone(), release.clone()));
    let catalog = Arc::new(RecordingCatalog::default());
    let sync = Arc::new(synchronizer(client.clone(), catalog.clone()));
    sync.register(Service::new(svc())).await;

    client.respond(Ok(submodels(&["A"])));
    let first = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.synchronize(&svc()).await })
    };

    // Wait until the first tick is inside the fetch
    entered.notified().await;

    let second = sync.synchronize(&svc()).await;
    assert!(second.is_skipped());
    assert!(second.changes().is_none());
    assert_eq!(client.calls(), 1);
    assert!(catalog.applied().is_empty());
    assert!(sync.registry().get(&svc()).await.unwrap().snapshot().is_none());

    release.add_permits(1);
    let first = first.await.unwrap();
    assert_eq!(added(first.changes().unwrap()), vec!["A"]);
    assert_eq!(catalog.applied().len(), 1);
}

#[tokio::test]
async fn test_ticks_for_distinct_services_run_concurrently() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Semaphore::new(0));
    let client = Arc::new(ScriptedClient::gated(entered.clone(), release.clone()));
    let sync = Arc::new(synchronizer(client.clone(), Arc::new(InMemoryCatalog::new())));

    let other = AccessUrl::parse("https://other:8443").unwrap();
    sync.register(Service::new(svc())).await;
    sync.register(Service::new(other.clone())).await;

    let first = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.synchronize(&svc()).await })
    };
    entered.notified().await;

    let second = {
        let sync = sync.clone();
        let other = other.clone();
        tokio::spawn(async move { sync.synchronize(&other).await })
    };
    entered.notified().await;
    assert_eq!(client.calls(), 2);

    release.add_permits(2);
    assert!(!first.await.unwrap().is_skipped());
    assert!(!second.await.unwrap().is_skipped());
}

#[tokio::test]
async fn test_slow_tick_is_abandoned() {
    let client = Arc::new(ScriptedClient::new());
    let catalog = Arc::new(RecordingCatalog::default());
    let sync = synchronizer(client.clone(), catalog.clone())
        .with_tick_timeout(Duration::from_millis(50));
    sync.register(Service::new(svc())).await;

    client.set_delay(Some(Duration::from_millis(500)));
    client.respond(Ok(submodels(&["A"])));
    let outcome = sync.synchronize(&svc()).await;

    let result = outcome.result().unwrap();
    assert!(result.is_recoverable());
    assert!(result.failures()[0].message().contains("abandoned"));
    assert!(sync.registry().get(&svc()).await.unwrap().snapshot().is_none());
    assert!(!sync.registry().is_in_flight(&svc()));
    assert!(catalog.applied().is_empty());

    // The next tick is not blocked by the abandoned one
    client.set_delay(None);
    client.respond(Ok(submodels(&["A"])));
    let outcome = sync.synchronize(&svc()).await;
    assert_eq!(added(outcome.changes().unwrap()), vec!["A"]);
}

#[tokio::test]
async fn test_vault_secret_missing_then_provided() {
    let client = Arc::new(ScriptedClient::new());
    let secrets = Arc::new(InMemorySecretStore::new());
    let sync = synchronizer(client.clone(), Arc::new(RecordingCatalog::default()));

    let auth = AuthenticationMethod::vault("svc-key", secrets.clone());
    sync.register(Service::new(svc()).with_auth(auth)).await;

    let outcome = sync.synchronize(&svc()).await;
    let result = outcome.result().unwrap();
    assert!(result.is_recoverable());
    assert_eq!(result.failures()[0].step(), Some("fetching"));
    assert_eq!(client.calls(), 0);
    // The service stays registered
    assert!(sync.registry().get(&svc()).await.is_some());

    secrets.insert("svc-key", "s3cret").await;
    client.respond(Ok(submodels(&["A"])));
    let outcome = sync.synchronize(&svc()).await;
    assert!(outcome.result().unwrap().is_success());
    let headers = client.last_headers().unwrap();
    assert_eq!(headers.get("x-api-key").map(String::as_str), Some("s3cret"));
}

#[tokio::test]
async fn test_unreachable_service_does_not_touch_registry() {
    let client = Arc::new(ScriptedClient::new());
    let catalog = Arc::new(RecordingCatalog::default());
    let sync = synchronizer(client.clone(), catalog.clone());
    sync.register(Service::new(svc())).await;

    client.respond(Ok(submodels(&["A"])));
    sync.synchronize(&svc()).await;
    let before = sync.registry().get(&svc()).await.unwrap().snapshot().cloned().unwrap();

    client.respond(Err(FetchError::Unreachable("connection refused".to_string())));
    let outcome = sync.synchronize(&svc()).await;
    assert!(outcome.result().unwrap().is_recoverable());
    assert!(outcome.changes().is_none());

    let after = sync.registry().get(&svc()).await.unwrap().snapshot().cloned().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(catalog.applied().len(), 1);
}

#[tokio::test]
async fn test_catalog_failure_keeps_registry_accurate() {
    let client = Arc::new(ScriptedClient::new());
    let catalog = Arc::new(RecordingCatalog::default());
    let sync = synchronizer(client.clone(), catalog.clone());
    sync.register(Service::new(svc())).await;

    catalog.failing.store(true, Ordering::SeqCst);
    client.respond(Ok(submodels(&["A", "B"])));
    let outcome = sync.synchronize(&svc()).await;

    let result = outcome.result().unwrap();
    assert!(result.is_recoverable());
    assert_eq!(result.failures()[0].step(), Some("emitting"));
    assert_eq!(added(outcome.changes().unwrap()), vec!["A", "B"]);

    // The registry reflects the remote state although the catalog missed it
    let stored = sync.registry().get(&svc()).await.unwrap();
    assert_eq!(stored.snapshot().unwrap().roots().len(), 2);

    catalog.failing.store(false, Ordering::SeqCst);
    client.respond(Ok(submodels(&["A", "B"])));
    let outcome = sync.synchronize(&svc()).await;
    assert!(outcome.changes().unwrap().is_empty());
    assert!(catalog.applied().is_empty());
}

#[tokio::test]
async fn test_fatal_tick_is_not_sticky() {
    let client = Arc::new(ScriptedClient::new());
    let sync = synchronizer(client.clone(), Arc::new(RecordingCatalog::default()));
    sync.register(Service::new(svc())).await;

    client.respond(Ok(submodels(&["A", "A"])));
    let outcome = sync.synchronize(&svc()).await;
    let result = outcome.result().unwrap();
    assert!(result.is_fatal());
    assert_eq!(result.failures()[0].step(), Some("diffing"));
    assert!(sync.registry().get(&svc()).await.unwrap().snapshot().is_none());

    client.respond(Ok(submodels(&["A"])));
    let outcome = sync.synchronize(&svc()).await;
    assert!(outcome.result().unwrap().is_success());
}

#[tokio::test]
async fn test_unregister_cleans_up_catalog() {
    let client = Arc::new(ScriptedClient::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let sync = synchronizer(client.clone(), catalog.clone());
    sync.register(Service::new(svc())).await;

    client.respond(Ok(ResourceGraph::new(vec![Resource::root(
        ResourceKind::Submodel,
        "A",
        json!({}),
    )
    .with_child("Prop", json!({ "value": 1 }))])));
    sync.synchronize(&svc()).await;
    assert_eq!(catalog.references(&svc()).await.len(), 2);

    let cleanup = sync.unregister(&svc()).await;
    assert!(cleanup.is_success());
    assert!(catalog.references(&svc()).await.is_empty());

    // Ticks for an unregistered service do nothing
    let outcome = sync.synchronize(&svc()).await;
    assert!(matches!(outcome, TickOutcome::Completed(ref r) if r.is_recoverable()));
    assert_eq!(client.calls(), 1);
}

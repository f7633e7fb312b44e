//! Concurrent registry of known remote services
//!
//! The registry is the only shared mutable state of the sync engine. It maps
//! canonical access URLs to [`Service`] records and tracks which services
//! currently have a synchronization tick in flight.
//!
//! Snapshots are stored as `Arc<ResourceGraph>` and never mutated: a tick
//! diffs against the `Arc` it read and installs its new snapshot with
//! [`ServiceRegistry::swap_snapshot`], a compare-and-swap on pointer
//! identity.

use aas_sync_core::{AccessUrl, ResourceGraph};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, instrument};

use crate::auth::AuthenticationMethod;

/// Errors from registry updates
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The service was unregistered (recoverable)
    #[error("Service {0} is not registered")]
    NotRegistered(AccessUrl),

    /// Another writer replaced the snapshot first (fatal for the tick)
    #[error("Snapshot of service {0} was replaced concurrently")]
    SnapshotConflict(AccessUrl),
}

impl RegistryError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RegistryError::SnapshotConflict(_))
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A remote service known to the catalog
#[derive(Debug, Clone)]
pub struct Service {
    access_url: AccessUrl,
    auth: Arc<AuthenticationMethod>,
    snapshot: Option<Arc<ResourceGraph>>,
    last_synced: Option<DateTime<Utc>>,
    origin: Option<AccessUrl>,
}

impl Service {
    /// A service without credentials, never synchronized
    pub fn new(access_url: AccessUrl) -> Self {
        Self {
            access_url,
            auth: Arc::new(AuthenticationMethod::None),
            snapshot: None,
            last_synced: None,
            origin: None,
        }
    }

    pub fn with_auth(self, auth: AuthenticationMethod) -> Self {
        self.with_shared_auth(Arc::new(auth))
    }

    /// Use an authentication method shared with other services
    pub fn with_shared_auth(mut self, auth: Arc<AuthenticationMethod>) -> Self {
        self.auth = auth;
        self
    }

    /// Mark this service as discovered through the given registry
    pub fn with_origin(mut self, registry: AccessUrl) -> Self {
        self.origin = Some(registry);
        self
    }

    pub fn access_url(&self) -> &AccessUrl {
        &self.access_url
    }

    pub fn auth(&self) -> &Arc<AuthenticationMethod> {
        &self.auth
    }

    /// Last synchronized snapshot (`None` before the first successful tick)
    pub fn snapshot(&self) -> Option<&Arc<ResourceGraph>> {
        self.snapshot.as_ref()
    }

    pub fn last_synced(&self) -> Option<DateTime<Utc>> {
        self.last_synced
    }

    /// Registry this service was discovered through, if any
    pub fn origin(&self) -> Option<&AccessUrl> {
        self.origin.as_ref()
    }
}

/// Keys with a tick in flight, shared with the guards that release them
#[derive(Default)]
struct TickTracker {
    in_flight: Mutex<HashSet<AccessUrl>>,
    released: Notify,
}

impl TickTracker {
    fn try_acquire(self: &Arc<Self>, url: &AccessUrl) -> Option<TickGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(url.clone()) {
            return None;
        }
        Some(TickGuard {
            url: url.clone(),
            tracker: Arc::clone(self),
        })
    }
}

/// Marks a service as in flight until dropped
#[derive(Debug)]
pub struct TickGuard {
    url: AccessUrl,
    tracker: Arc<TickTracker>,
}

impl TickGuard {
    pub fn url(&self) -> &AccessUrl {
        &self.url
    }
}

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.tracker
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.url);
        self.tracker.released.notify_waiters();
    }
}

impl std::fmt::Debug for TickTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickTracker").finish_non_exhaustive()
    }
}

/// Concurrent keyed store of known services
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<AccessUrl, Service>>,
    ticks: Arc<TickTracker>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, url: &AccessUrl) -> Option<Service> {
        self.services.read().await.get(url).cloned()
    }

    /// Copy of every service at call time, ordered by access URL
    pub async fn get_all(&self) -> Vec<Service> {
        let services = self.services.read().await;
        let mut all: Vec<Service> = services.values().cloned().collect();
        all.sort_by(|a, b| a.access_url.cmp(&b.access_url));
        all
    }

    pub async fn contains(&self, url: &AccessUrl) -> bool {
        self.services.read().await.contains_key(url)
    }

    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }

    /// Register a service. Returns `false` and keeps the existing entry if the
    /// URL is already known.
    #[instrument(skip(self, service), fields(service = %service.access_url))]
    pub async fn put(&self, service: Service) -> bool {
        let mut services = self.services.write().await;
        if services.contains_key(&service.access_url) {
            debug!("Service already registered");
            return false;
        }
        services.insert(service.access_url.clone(), service);
        debug!("Service registered");
        true
    }

    /// Replace an existing entry. Never creates one.
    #[instrument(skip(self, service), fields(service = %service.access_url))]
    pub async fn update(&self, service: Service) -> bool {
        let mut services = self.services.write().await;
        match services.get_mut(&service.access_url) {
            Some(slot) => {
                *slot = service;
                true
            }
            None => false,
        }
    }

    #[instrument(skip(self), fields(service = %url))]
    pub async fn remove(&self, url: &AccessUrl) -> Option<Service> {
        let removed = self.services.write().await.remove(url);
        if removed.is_some() {
            debug!("Service unregistered");
        }
        removed
    }

    /// Install `new` as the service's snapshot if its current snapshot is
    /// still `expected` (compared by identity).
    ///
    /// Nothing is modified on failure. On success the previous snapshot is
    /// returned and the synchronization time is updated.
    #[instrument(skip(self, expected, new), fields(service = %url))]
    pub async fn swap_snapshot(
        &self,
        url: &AccessUrl,
        expected: Option<&Arc<ResourceGraph>>,
        new: Arc<ResourceGraph>,
    ) -> RegistryResult<Option<Arc<ResourceGraph>>> {
        let mut services = self.services.write().await;
        let service = services
            .get_mut(url)
            .ok_or_else(|| RegistryError::NotRegistered(url.clone()))?;

        let unchanged = match (service.snapshot.as_ref(), expected) {
            (None, None) => true,
            (Some(current), Some(expected)) => Arc::ptr_eq(current, expected),
            _ => false,
        };
        if !unchanged {
            return Err(RegistryError::SnapshotConflict(url.clone()));
        }

        service.last_synced = Some(Utc::now());
        let previous = service.snapshot.replace(new);
        debug!(bootstrap = previous.is_none(), "Snapshot installed");
        Ok(previous)
    }

    /// Mark a service as in flight unless a tick for it is already running
    pub fn try_begin_tick(&self, url: &AccessUrl) -> Option<TickGuard> {
        self.ticks.try_acquire(url)
    }

    /// Wait until no tick for the service is running, then mark it in flight
    pub async fn begin_tick(&self, url: &AccessUrl) -> TickGuard {
        loop {
            let released = self.ticks.released.notified();
            if let Some(guard) = self.ticks.try_acquire(url) {
                return guard;
            }
            released.await;
        }
    }

    pub fn is_in_flight(&self, url: &AccessUrl) -> bool {
        self.ticks
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(url)
    }
}

//! Service discovery through remote registries
//!
//! A registry advertises the access URLs of the services it knows. Newly
//! advertised services are registered with the registry as their origin and
//! inherit its authentication method. Services the registry no longer
//! advertises are unregistered, including catalog cleanup. Services that
//! were registered explicitly, or through another registry, are left alone.

use aas_sync_core::{AccessUrl, ChangeSet};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::adapters::RegistryClient;
use crate::auth::AuthenticationMethod;
use crate::error::SyncResult;
use crate::registry::Service;
use crate::sync::synchronizer::ServiceSynchronizer;

/// Registered (added) and unregistered (removed) services of one discovery pass
pub type DiscoveryChanges = ChangeSet<AccessUrl, AccessUrl>;

/// Keeps the registered services in line with what registries advertise
pub struct RegistryDiscovery {
    client: Arc<dyn RegistryClient>,
    synchronizer: Arc<ServiceSynchronizer>,
}

impl RegistryDiscovery {
    pub fn new(client: Arc<dyn RegistryClient>, synchronizer: Arc<ServiceSynchronizer>) -> Self {
        Self {
            client,
            synchronizer,
        }
    }

    /// Fetch the registry's service list and reconcile registrations
    #[instrument(skip(self, registry, auth), fields(registry = %registry))]
    pub async fn discover(
        &self,
        registry: &AccessUrl,
        auth: Arc<AuthenticationMethod>,
    ) -> SyncResult<DiscoveryChanges> {
        let headers = auth.headers().await?;
        let advertised = self.client.fetch_services(registry, &headers).await?;

        let mut seen = HashSet::new();
        let mut changes = ChangeSet::builder();

        for url in advertised {
            if !seen.insert(url.clone()) {
                continue;
            }
            let service = Service::new(url.clone())
                .with_shared_auth(auth.clone())
                .with_origin(registry.clone());
            if self.synchronizer.register(service).await {
                changes = changes.add(url);
            }
        }

        let stale: Vec<AccessUrl> = self
            .synchronizer
            .registry()
            .get_all()
            .await
            .into_iter()
            .filter(|service| service.origin() == Some(registry))
            .map(|service| service.access_url().clone())
            .filter(|url| !seen.contains(url))
            .collect();

        for url in stale {
            let cleanup = self.synchronizer.unregister(&url).await;
            if !cleanup.is_success() {
                warn!(service = %url, failures = cleanup.failures().len(), "Cleanup after discovery was incomplete");
            }
            changes = changes.remove(url);
        }

        let changes = changes.build();
        info!(
            registered = changes.to_add().len(),
            unregistered = changes.to_remove().len(),
            "Discovery finished"
        );
        Ok(changes)
    }
}

//! Pipeline steps of one synchronization tick
//!
//! ```text
//! Service -> FetchSnapshot -> [RestrictKinds] -> DiffSnapshots -> SwapSnapshot -> EmitChanges
//! ```
//!
//! Each step passes `None` through untouched, so once a recoverable failure
//! drops the payload the remaining steps do nothing.

use aas_sync_core::{
    diff, AccessUrl, PipelineResult, PipelineStep, ResourceGraph, ResourceKind, ServiceChangeSet,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::adapters::{CatalogApplier, ServiceClient};
use crate::error::SyncError;
use crate::registry::{RegistryError, Service, ServiceRegistry};

/// Phases a tick moves through, used to attribute failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickPhase {
    Fetching,
    Diffing,
    Updating,
    Emitting,
}

impl TickPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickPhase::Fetching => "fetching",
            TickPhase::Diffing => "diffing",
            TickPhase::Updating => "updating",
            TickPhase::Emitting => "emitting",
        }
    }
}

impl fmt::Display for TickPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn failed<T>(error: impl Into<SyncError>) -> PipelineResult<Option<T>> {
    PipelineResult::failure(None, error.into().to_failure())
}

/// Remote state of a service as just fetched
#[derive(Debug, Clone)]
pub struct FetchedSnapshot {
    pub service: Service,
    pub graph: ResourceGraph,
}

/// Result of diffing a fetched snapshot against the registry
#[derive(Debug, Clone)]
pub struct SnapshotDiff {
    pub url: AccessUrl,
    /// Snapshot the diff was computed against (`None` on first sync)
    pub old: Option<Arc<ResourceGraph>>,
    pub new: Arc<ResourceGraph>,
    pub changes: ServiceChangeSet,
}

/// Fetches the service's current resource graph with its credentials
pub struct FetchSnapshot {
    client: Arc<dyn ServiceClient>,
}

impl FetchSnapshot {
    pub fn new(client: Arc<dyn ServiceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PipelineStep for FetchSnapshot {
    type Input = Service;
    type Output = Option<FetchedSnapshot>;

    fn name(&self) -> &str {
        TickPhase::Fetching.as_str()
    }

    #[instrument(skip(self, service), fields(service = %service.access_url()))]
    async fn apply(&self, service: Service) -> PipelineResult<Option<FetchedSnapshot>> {
        let headers = match service.auth().headers().await {
            Ok(headers) => headers,
            Err(e) => return failed(e),
        };

        match self.client.fetch_snapshot(service.access_url(), &headers).await {
            Ok(graph) => {
                debug!(resources = graph.walk().len(), "Fetched snapshot");
                PipelineResult::success(Some(FetchedSnapshot { service, graph }))
            }
            Err(e) => failed(e),
        }
    }
}

/// Keeps only root resources of the given kinds
pub struct RestrictKinds {
    kinds: Vec<ResourceKind>,
}

impl RestrictKinds {
    pub fn new(kinds: Vec<ResourceKind>) -> Self {
        Self { kinds }
    }

    pub fn submodels_only() -> Self {
        Self::new(vec![ResourceKind::Submodel])
    }
}

#[async_trait]
impl PipelineStep for RestrictKinds {
    type Input = Option<FetchedSnapshot>;
    type Output = Option<FetchedSnapshot>;

    fn name(&self) -> &str {
        TickPhase::Fetching.as_str()
    }

    async fn apply(&self, input: Option<FetchedSnapshot>) -> PipelineResult<Option<FetchedSnapshot>> {
        PipelineResult::success(input.map(|fetched| FetchedSnapshot {
            graph: fetched.graph.retain_kinds(&self.kinds),
            service: fetched.service,
        }))
    }
}

/// Diffs the fetched graph against the registry's current snapshot
pub struct DiffSnapshots {
    registry: Arc<ServiceRegistry>,
}

impl DiffSnapshots {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PipelineStep for DiffSnapshots {
    type Input = Option<FetchedSnapshot>;
    type Output = Option<SnapshotDiff>;

    fn name(&self) -> &str {
        TickPhase::Diffing.as_str()
    }

    async fn apply(&self, input: Option<FetchedSnapshot>) -> PipelineResult<Option<SnapshotDiff>> {
        let Some(fetched) = input else {
            return PipelineResult::success(None);
        };
        let url = fetched.service.access_url().clone();

        let Some(current) = self.registry.get(&url).await else {
            return failed(RegistryError::NotRegistered(url));
        };
        let old = current.snapshot().cloned();

        match diff(old.as_deref(), &fetched.graph) {
            Ok(changes) => {
                debug!(
                    service = %url,
                    additions = changes.to_add().len(),
                    removals = changes.to_remove().len(),
                    "Computed change set"
                );
                PipelineResult::success(Some(SnapshotDiff {
                    url,
                    old,
                    new: Arc::new(fetched.graph),
                    changes,
                }))
            }
            Err(e) => failed(e),
        }
    }
}

/// Installs the new snapshot if nobody replaced the old one meanwhile
pub struct SwapSnapshot {
    registry: Arc<ServiceRegistry>,
}

impl SwapSnapshot {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PipelineStep for SwapSnapshot {
    type Input = Option<SnapshotDiff>;
    type Output = Option<SnapshotDiff>;

    fn name(&self) -> &str {
        TickPhase::Updating.as_str()
    }

    async fn apply(&self, input: Option<SnapshotDiff>) -> PipelineResult<Option<SnapshotDiff>> {
        let Some(snapshot_diff) = input else {
            return PipelineResult::success(None);
        };

        match self
            .registry
            .swap_snapshot(
                &snapshot_diff.url,
                snapshot_diff.old.as_ref(),
                snapshot_diff.new.clone(),
            )
            .await
        {
            Ok(_) => PipelineResult::success(Some(snapshot_diff)),
            Err(e) => failed(e),
        }
    }
}

/// Hands non-empty change sets to the catalog
///
/// A catalog failure is recoverable and the registry swap stays in place;
/// the change set is still returned to the caller.
pub struct EmitChanges {
    catalog: Arc<dyn CatalogApplier>,
}

impl EmitChanges {
    pub fn new(catalog: Arc<dyn CatalogApplier>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl PipelineStep for EmitChanges {
    type Input = Option<SnapshotDiff>;
    type Output = Option<ServiceChangeSet>;

    fn name(&self) -> &str {
        TickPhase::Emitting.as_str()
    }

    async fn apply(&self, input: Option<SnapshotDiff>) -> PipelineResult<Option<ServiceChangeSet>> {
        let Some(SnapshotDiff { url, changes, .. }) = input else {
            return PipelineResult::success(None);
        };

        if changes.is_empty() {
            debug!(service = %url, "No changes to emit");
            return PipelineResult::success(Some(changes));
        }

        match self.catalog.apply(&url, changes.clone()).await {
            Ok(()) => PipelineResult::success(Some(changes)),
            Err(e) => PipelineResult::recoverable(
                Some(Some(changes)),
                SyncError::from(e).to_failure(),
            ),
        }
    }
}

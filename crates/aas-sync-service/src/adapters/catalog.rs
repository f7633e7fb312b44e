//! Catalog Applier Adapter
//!
//! Seam to the local asset catalog that change sets are applied to. The
//! in-memory implementation keeps one entry per resource reference and
//! service, which is all the synchronizer needs to be exercised end to end.

use aas_sync_core::{AccessUrl, ResourceEntry, ResourceReference, ServiceChangeSet};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Errors from applying a change set. Always recoverable for a tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("Catalog rejected change set: {0}")]
    Rejected(String),
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Result type for catalog operations
pub type ApplyResult<T> = Result<T, ApplyError>;

/// Applies per-service change sets to the catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogApplier: Send + Sync {
    /// Apply removals then additions for the resources of `service`
    async fn apply(&self, service: &AccessUrl, changes: ServiceChangeSet) -> ApplyResult<()>;
}

type Entries = BTreeMap<ResourceReference, serde_json::Value>;

/// Catalog held in process memory
#[derive(Default)]
pub struct InMemoryCatalog {
    services: RwLock<HashMap<AccessUrl, Entries>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current catalog entries for a service, ordered by reference
    pub async fn entries(&self, service: &AccessUrl) -> Vec<ResourceEntry> {
        let services = self.services.read().await;
        services
            .get(service)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(reference, content)| ResourceEntry {
                        reference: reference.clone(),
                        content: content.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// References currently linked to a service, ordered
    pub async fn references(&self, service: &AccessUrl) -> Vec<ResourceReference> {
        let services = self.services.read().await;
        services
            .get(service)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CatalogApplier for InMemoryCatalog {
    #[instrument(skip(self, changes), fields(service = %service))]
    async fn apply(&self, service: &AccessUrl, changes: ServiceChangeSet) -> ApplyResult<()> {
        let (to_add, to_remove) = changes.into_parts();
        let added = to_add.len();
        let mut services = self.services.write().await;
        let entries = services.entry(service.clone()).or_default();

        for reference in &to_remove {
            entries.remove(reference);
        }
        for entry in to_add {
            entries.insert(entry.reference, entry.content);
        }

        debug!(
            added,
            removed = to_remove.len(),
            total = entries.len(),
            "Applied change set to catalog"
        );

        if entries.is_empty() {
            services.remove(service);
        }
        Ok(())
    }
}

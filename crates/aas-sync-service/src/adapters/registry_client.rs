//! Registry Client Adapter
//!
//! Seam to remote registries (registries of services). A registry only
//! advertises service access URLs; their contents are fetched separately
//! through the service client.

use aas_sync_core::AccessUrl;
use async_trait::async_trait;

use super::service_client::{FetchResult, Headers};

/// Lists the services a remote registry advertises
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn fetch_services(&self, registry: &AccessUrl, headers: &Headers)
        -> FetchResult<Vec<AccessUrl>>;
}

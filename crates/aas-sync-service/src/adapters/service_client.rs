//! Service Client Adapter
//!
//! Seam to the transport that reads a remote service's resource graph. The
//! HTTP stack, retry policy and response decoding live behind this trait.

use aas_sync_core::{AccessUrl, ResourceGraph};
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

/// Outbound request headers (name -> value)
pub type Headers = BTreeMap<String, String>;

/// Errors from fetching remote state. All of them are recoverable for a tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Service unreachable: {0}")]
    Unreachable(String),
    #[error("TLS failure: {0}")]
    Tls(String),
    #[error("Unexpected response status {0}")]
    Status(u16),
    #[error("Invalid response body: {0}")]
    Decode(String),
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Reads the current snapshot of a remote service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Fetch everything the service at `url` exposes, sending `headers`
    async fn fetch_snapshot(&self, url: &AccessUrl, headers: &Headers)
        -> FetchResult<ResourceGraph>;
}

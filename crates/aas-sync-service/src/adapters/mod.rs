//! Adapters for the collaborators around the synchronizer
//!
//! This module defines the seams to everything outside the sync engine:
//! - Service client: reads resource graphs from remote services
//! - Registry client: lists the services a remote registry advertises
//! - Catalog applier: applies change sets to the local catalog
//! - Secret store: resolves vault aliases for authentication
//!
//! In-memory implementations are provided for the catalog and secret store.

pub mod catalog;
pub mod registry_client;
pub mod secret_store;
pub mod service_client;

// Re-export adapter types for convenience
pub use catalog::{ApplyError, ApplyResult, CatalogApplier, InMemoryCatalog};
pub use registry_client::RegistryClient;
pub use secret_store::{InMemorySecretStore, SecretStore};
pub use service_client::{FetchError, FetchResult, Headers, ServiceClient};

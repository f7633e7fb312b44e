//! AAS Sync Service
//!
//! Keeps a local asset catalog in line with remote asset administration
//! shell services. Services are tracked in a concurrent [`ServiceRegistry`];
//! the [`ServiceSynchronizer`] fetches each service with its
//! [`AuthenticationMethod`], diffs the result against the last snapshot and
//! hands the change set to a [`CatalogApplier`](adapters::CatalogApplier).
//! The [`SyncScheduler`] drives this periodically.
//!
//! The crate logs through `tracing` and installs no subscriber.

pub mod adapters;
pub mod auth;
pub mod config;
pub mod error;
pub mod registry;
pub mod sync;

pub use auth::{AuthConfig, AuthenticationMethod};
pub use config::{EndpointConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use registry::{RegistryError, Service, ServiceRegistry, TickGuard};
pub use sync::{RegistryDiscovery, SchedulerHandle, ServiceSynchronizer, SyncScheduler, TickOutcome};

//! Synchronization engine
//!
//! - [`steps`]: the pipeline steps of one tick
//! - [`synchronizer`]: runs ticks per service, skip-if-in-flight and timeout
//! - [`discovery`]: registers and prunes services advertised by registries
//! - [`scheduler`]: periodic rounds over all services

pub mod discovery;
pub mod scheduler;
pub mod steps;
pub mod synchronizer;

pub use discovery::{DiscoveryChanges, RegistryDiscovery};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use steps::{FetchedSnapshot, SnapshotDiff, TickPhase};
pub use synchronizer::{ServiceSynchronizer, TickOutcome, TickResult};

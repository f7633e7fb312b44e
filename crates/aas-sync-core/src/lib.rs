//! AAS Sync Core
//!
//! Domain types and algorithms for mirroring remote asset administration
//! shell services into a local catalog: canonical access URLs, resource
//! graphs, change sets with the snapshot diff, and the typed processing
//! pipeline used to run a synchronization tick.

pub mod access_url;
pub mod change_set;
pub mod error;
pub mod pipeline;
pub mod resource;

pub use access_url::AccessUrl;
pub use change_set::{diff, removal_of, ChangeSet, ChangeSetBuilder, ServiceChangeSet};
pub use error::{CoreError, CoreResult};
pub use pipeline::{
    CollectionFeeder, FailureSink, Filter, FnStep, Pipeline, PipelineBuilder, PipelineFailure,
    PipelineResult, PipelineStep, Severity, TracingFailureSink, Zipper,
};
pub use resource::{Resource, ResourceEntry, ResourceGraph, ResourceKind, ResourceReference};

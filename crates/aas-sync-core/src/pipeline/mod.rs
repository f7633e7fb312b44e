//! Composable, short-circuiting processing pipelines
//!
//! A [`Pipeline`] runs an ordered chain of [`PipelineStep`]s. Each step
//! returns a tri-state [`PipelineResult`]: success, a recoverable failure
//! (recorded, processing continues) or a fatal failure (processing stops).

mod builder;
pub mod helpers;
mod result;
mod sink;
mod step;

pub use builder::{Pipeline, PipelineBuilder};
pub use helpers::{CollectionFeeder, Filter, FnStep, Zipper};
pub use result::{PipelineFailure, PipelineResult, Severity};
pub use sink::{FailureSink, TracingFailureSink};
pub use step::PipelineStep;

//! Failure sinks
//!
//! Every failure recorded during a pipeline execution is reported to the
//! pipeline's sink in addition to being returned to the caller.

use tracing::{error, info, warn};

use super::result::{PipelineFailure, Severity};

/// Observer for failures recorded by a pipeline
pub trait FailureSink: Send + Sync {
    /// Called once per failure, in the order failures are recorded
    fn report(&self, pipeline: &str, failure: &PipelineFailure);
}

/// Default sink: logs each failure at a level matching its severity
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFailureSink;

impl FailureSink for TracingFailureSink {
    fn report(&self, pipeline: &str, failure: &PipelineFailure) {
        let step = failure.step().unwrap_or("<pipeline>");
        match failure.severity() {
            Severity::Fatal => error!(
                pipeline = %pipeline,
                step = %step,
                message = %failure.message(),
                "Pipeline step failed fatally"
            ),
            Severity::Warning => warn!(
                pipeline = %pipeline,
                step = %step,
                message = %failure.message(),
                "Pipeline step failed"
            ),
            Severity::Info => info!(
                pipeline = %pipeline,
                step = %step,
                message = %failure.message(),
                "Pipeline step reported"
            ),
        }
    }
}

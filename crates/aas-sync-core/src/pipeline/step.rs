//! The pipeline step contract

use async_trait::async_trait;

use super::result::PipelineResult;

/// A single typed stage of a pipeline
///
/// Adjacent steps compose when the output type of one is the input type of
/// the next; the builder checks this at compile time.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Name used when attributing failures (defaults to the type name)
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Transform the input of this step into its output
    async fn apply(&self, input: Self::Input) -> PipelineResult<Self::Output>;
}

/// `aas_sync_core::pipeline::helpers::Filter<alloc::string::String>` -> `Filter`
fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

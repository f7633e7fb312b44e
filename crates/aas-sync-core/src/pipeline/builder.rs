//! Pipeline composition and execution
//!
//! A pipeline is a typed chain of stages. Each call to
//! [`PipelineBuilder::step`] wraps the chain built so far together with the
//! new step, so the output type of the chain always matches the input type of
//! the next step. Execution walks the chain front to back, recording failures
//! as it goes and stopping at the first fatal one.

use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::result::{PipelineFailure, PipelineResult};
use super::sink::{FailureSink, TracingFailureSink};
use super::step::PipelineStep;

type Supplier<I> = Box<dyn Fn() -> I + Send + Sync>;
type Fallback<O> = Box<dyn Fn() -> O + Send + Sync>;

/// Failures recorded so far during one execution
struct RunContext<'a> {
    pipeline: &'a str,
    sink: &'a dyn FailureSink,
    failures: Vec<PipelineFailure>,
}

impl<'a> RunContext<'a> {
    fn new(pipeline: &'a str, sink: &'a dyn FailureSink) -> Self {
        Self {
            pipeline,
            sink,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, failures: Vec<PipelineFailure>) {
        for failure in failures {
            self.sink.report(self.pipeline, &failure);
            self.failures.push(failure);
        }
    }

    fn finish<O>(self, outcome: Option<O>) -> PipelineResult<O> {
        match outcome {
            Some(content) if self.failures.is_empty() => PipelineResult::Success(content),
            Some(content) => PipelineResult::RecoverableFailure {
                content: Some(content),
                failures: self.failures,
            },
            None => PipelineResult::FatalFailure {
                failures: self.failures,
            },
        }
    }
}

/// Type-erased prefix of a pipeline. `None` means a fatal failure halted it.
trait Stage<I, O>: Send + Sync {
    fn run<'a>(&'a self, input: I, ctx: &'a mut RunContext<'_>) -> BoxFuture<'a, Option<O>>;
}

struct Identity;

impl<I: Send + 'static> Stage<I, I> for Identity {
    fn run<'a>(&'a self, input: I, _ctx: &'a mut RunContext<'_>) -> BoxFuture<'a, Option<I>> {
        Box::pin(async move { Some(input) })
    }
}

struct Chain<I, S: PipelineStep> {
    head: Box<dyn Stage<I, S::Input>>,
    step: S,
    fallback: Fallback<S::Output>,
}

impl<I, S> Stage<I, S::Output> for Chain<I, S>
where
    I: Send + 'static,
    S: PipelineStep + 'static,
{
    fn run<'a>(
        &'a self,
        input: I,
        ctx: &'a mut RunContext<'_>,
    ) -> BoxFuture<'a, Option<S::Output>> {
        Box::pin(async move {
            let value = self.head.run(input, &mut *ctx).await?;
            let name = self.step.name();

            match self.step.apply(value).await.attributed_to(name) {
                PipelineResult::Success(output) => Some(output),
                PipelineResult::RecoverableFailure { content, failures } => {
                    ctx.record(failures);
                    Some(content.unwrap_or_else(|| (self.fallback)()))
                }
                PipelineResult::FatalFailure { failures } => {
                    ctx.record(failures);
                    debug!(pipeline = %ctx.pipeline, step = %name, "Pipeline halted");
                    None
                }
            }
        })
    }
}

/// An ordered, short-circuiting composition of steps from `I` to `O`
pub struct Pipeline<I, O> {
    name: String,
    supplier: Option<Supplier<I>>,
    stages: Box<dyn Stage<I, O>>,
    sink: Arc<dyn FailureSink>,
}

impl<I: Send + 'static> Pipeline<I, I> {
    /// Start building a pipeline; the input type is fixed by the first step
    pub fn builder(name: impl Into<String>) -> PipelineBuilder<I, I> {
        PipelineBuilder::new(name)
    }
}

impl<I: Send + 'static, O: Send + 'static> Pipeline<I, O> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run every step on the given seed value.
    ///
    /// Steps run in registration order. A fatal failure stops execution and
    /// the result carries every failure recorded up to that point. Otherwise
    /// the result holds the final value, tagged as recoverable when any step
    /// failed along the way.
    #[instrument(skip(self, seed), fields(pipeline = %self.name))]
    pub async fn execute(&self, seed: I) -> PipelineResult<O> {
        let mut ctx = RunContext::new(&self.name, self.sink.as_ref());
        let outcome = self.stages.run(seed, &mut ctx).await;
        ctx.finish(outcome)
    }

    /// Run the pipeline on a value produced by its supplier
    pub async fn run(&self) -> PipelineResult<O> {
        self.execute_or_supply(None).await
    }

    /// Run on `seed` when given, otherwise on a value from the supplier.
    ///
    /// Having neither is a configuration error and yields a fatal failure
    /// without running any step. A payload that may be absent is modelled as
    /// `Option<_>`: seeding with `None` runs the steps (and a pipeline
    /// without steps returns the `None` unchanged).
    pub async fn execute_or_supply(&self, seed: Option<I>) -> PipelineResult<O> {
        let seed = match (seed, &self.supplier) {
            (Some(seed), _) => seed,
            (None, Some(supplier)) => supplier(),
            (None, None) => {
                let failure = PipelineFailure::fatal(format!(
                    "pipeline '{}' has neither a seed value nor a supplier",
                    self.name
                ));
                self.sink.report(&self.name, &failure);
                return PipelineResult::fatal(failure);
            }
        };
        self.execute(seed).await
    }
}

impl<I, O> std::fmt::Debug for Pipeline<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("has_supplier", &self.supplier.is_some())
            .finish_non_exhaustive()
    }
}

/// Accumulates steps for a [`Pipeline`]
///
/// `O` is the output type of the steps added so far.
pub struct PipelineBuilder<I, O> {
    name: String,
    supplier: Option<Supplier<I>>,
    stages: Box<dyn Stage<I, O>>,
    sink: Arc<dyn FailureSink>,
}

impl<I: Send + 'static> PipelineBuilder<I, I> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supplier: None,
            stages: Box::new(Identity),
            sink: Arc::new(TracingFailureSink),
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> PipelineBuilder<I, O> {
    /// Producer of the initial value, used when no seed is given
    pub fn supplier(mut self, supplier: impl Fn() -> I + Send + Sync + 'static) -> Self {
        self.supplier = Some(Box::new(supplier));
        self
    }

    /// Replace the default tracing sink
    pub fn failure_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Append a step. On a recoverable failure without content the next step
    /// receives `S::Output::default()`.
    pub fn step<S>(self, step: S) -> PipelineBuilder<I, S::Output>
    where
        S: PipelineStep<Input = O> + 'static,
        S::Output: Default,
    {
        self.step_with_fallback(step, <S::Output as Default>::default)
    }

    /// Append a step with an explicit fallback value for recoverable failures
    /// that carry no content.
    pub fn step_with_fallback<S, F>(self, step: S, fallback: F) -> PipelineBuilder<I, S::Output>
    where
        S: PipelineStep<Input = O> + 'static,
        F: Fn() -> S::Output + Send + Sync + 'static,
    {
        PipelineBuilder {
            name: self.name,
            supplier: self.supplier,
            stages: Box::new(Chain {
                head: self.stages,
                step,
                fallback: Box::new(fallback),
            }),
            sink: self.sink,
        }
    }

    pub fn build(self) -> Pipeline<I, O> {
        Pipeline {
            name: self.name,
            supplier: self.supplier,
            stages: self.stages,
            sink: self.sink,
        }
    }
}

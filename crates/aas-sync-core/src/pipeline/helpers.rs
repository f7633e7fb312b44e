//! Reusable steps

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;

use super::result::PipelineResult;
use super::step::PipelineStep;

/// A step backed by a synchronous closure
pub struct FnStep<I, O, F> {
    name: String,
    f: F,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, F> FnStep<I, O, F>
where
    F: Fn(I) -> PipelineResult<O>,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<I, O, F> PipelineStep for FnStep<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> PipelineResult<O> + Send + Sync,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, input: I) -> PipelineResult<O> {
        (self.f)(input)
    }
}

/// Keeps only the elements of a collection that match a predicate
pub struct Filter<T> {
    name: String,
    predicate: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> Filter<T> {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> PipelineStep for Filter<T> {
    type Input = Vec<T>;
    type Output = Vec<T>;

    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, input: Vec<T>) -> PipelineResult<Vec<T>> {
        PipelineResult::success(input.into_iter().filter(|item| (self.predicate)(item)).collect())
    }
}

/// Applies an inner step to every element of a collection.
///
/// Elements are processed concurrently and the individual results are
/// combined with [`PipelineResult::merge`]: one fatal element fails the
/// whole collection, recoverable ones keep whatever content they produced.
pub struct CollectionFeeder<S> {
    inner: S,
}

impl<S: PipelineStep> CollectionFeeder<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: PipelineStep> PipelineStep for CollectionFeeder<S> {
    type Input = Vec<S::Input>;
    type Output = Vec<S::Output>;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn apply(&self, input: Vec<S::Input>) -> PipelineResult<Vec<S::Output>> {
        let name = self.inner.name();
        let results = join_all(input.into_iter().map(|item| self.inner.apply(item))).await;
        PipelineResult::merge(results.into_iter().map(|r| r.attributed_to(name)))
    }
}

/// Applies an inner step to every element and keys each output by its input.
///
/// Results are combined like [`CollectionFeeder`]; elements whose step
/// produced no content are left out of the map. When two elements share a
/// key the later one wins.
pub struct Zipper<S: PipelineStep, K> {
    inner: S,
    key: Box<dyn Fn(&S::Input) -> K + Send + Sync>,
}

impl<S: PipelineStep, K> Zipper<S, K> {
    pub fn new(inner: S, key: impl Fn(&S::Input) -> K + Send + Sync + 'static) -> Self {
        Self {
            inner,
            key: Box::new(key),
        }
    }
}

#[async_trait]
impl<S, K> PipelineStep for Zipper<S, K>
where
    S: PipelineStep,
    K: Eq + Hash + Send + 'static,
{
    type Input = Vec<S::Input>;
    type Output = HashMap<K, S::Output>;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn apply(&self, input: Vec<S::Input>) -> PipelineResult<HashMap<K, S::Output>> {
        let name = self.inner.name();
        let keys: Vec<K> = input.iter().map(|item| (self.key)(item)).collect();
        let results = join_all(input.into_iter().map(|item| self.inner.apply(item))).await;

        let keyed = keys
            .into_iter()
            .zip(results)
            .map(|(key, result)| result.map(|output| (key, output)).attributed_to(name));
        PipelineResult::merge(keyed).map(|pairs| pairs.into_iter().collect())
    }
}

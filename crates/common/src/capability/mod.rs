//! Capability composition
//!
//! A capability decorates the test lifecycle. Capabilities are folded onto a
//! base layer in an explicit order. The last one applied is the outermost
//! decorator, and every hook receives a [`Next`] handle through which it
//! delegates to the layers beneath it. No capability knows about any other.

pub mod conditional;
pub mod fixture;
pub mod isolation;

use crate::lifecycle::{RunContext, TestRun};
use crate::model::Implementation;
use crate::result::TestResult;
use crate::util::TimeLimit;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub use conditional::Conditional;
pub use fixture::{FixtureBuilderExt, FixtureOutput, Fixtures};
pub use isolation::Isolation;

/// A lifecycle decorator.
///
/// Every hook defaults to plain delegation, so a capability only overrides the
/// stages it cares about. An override that never calls `next` cuts the inner
/// layers out of that stage.
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &'static str;

    async fn wind_up(&self, run: &TestRun<'_>, context: RunContext, next: Next<'_>) -> anyhow::Result<RunContext> {
        next.wind_up(run, context).await
    }

    async fn wind_down(&self, run: &TestRun<'_>, context: &mut RunContext, next: Next<'_>) -> anyhow::Result<()> {
        next.wind_down(run, context).await
    }

    fn post_process(&self, run: &TestRun<'_>, context: &RunContext, result: TestResult, next: Next<'_>) -> TestResult {
        next.post_process(run, context, result)
    }
}

/// The layers beneath the one currently executing.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    layers: &'a [Arc<dyn Capability>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(layers: &'a [Arc<dyn Capability>]) -> Self {
        Self { layers }
    }

    pub async fn wind_up(self, run: &TestRun<'_>, context: RunContext) -> anyhow::Result<RunContext> {
        match self.layers.split_last() {
            Some((layer, inner)) => layer.wind_up(run, context, Next::new(inner)).await,
            None => Ok(context),
        }
    }

    pub async fn wind_down(self, run: &TestRun<'_>, context: &mut RunContext) -> anyhow::Result<()> {
        match self.layers.split_last() {
            Some((layer, inner)) => layer.wind_down(run, context, Next::new(inner)).await,
            None => Ok(()),
        }
    }

    pub fn post_process(self, run: &TestRun<'_>, context: &RunContext, result: TestResult) -> TestResult {
        match self.layers.split_last() {
            Some((layer, inner)) => layer.post_process(run, context, result, Next::new(inner)),
            None => result,
        }
    }
}

/// Innermost layer: races the implementation against the test's time budget
/// and defuses the deadline on wind-down.
struct Base;

#[async_trait]
impl Capability for Base {
    fn name(&self) -> &'static str {
        "base"
    }

    async fn wind_up(&self, run: &TestRun<'_>, mut context: RunContext, _next: Next<'_>) -> anyhow::Result<RunContext> {
        let limit = TimeLimit::new(run.timeout_ms());
        let inner = context.implementation.clone();
        let racing = limit.clone();
        context.implementation = Implementation::from_boxed(move |fixture| {
            let work = inner.call(fixture);
            let limit = racing.clone();
            Box::pin(async move { limit.race(work).await })
        });
        context.extensions.insert(limit);
        Ok(context)
    }

    async fn wind_down(&self, _run: &TestRun<'_>, context: &mut RunContext, _next: Next<'_>) -> anyhow::Result<()> {
        if let Some(limit) = context.extensions.get::<TimeLimit>() {
            limit.cancel();
        }
        Ok(())
    }
}

/// An ordered stack of capabilities over the base layer.
#[derive(Clone)]
pub struct Composition {
    layers: Vec<Arc<dyn Capability>>,
}

impl Default for Composition {
    fn default() -> Self {
        Self::base()
    }
}

impl Composition {
    pub fn base() -> Self {
        Self {
            layers: vec![Arc::new(Base)],
        }
    }

    /// Apply one more capability on top.
    pub fn with<C: Capability + 'static>(self, capability: C) -> Self {
        self.with_shared(Arc::new(capability))
    }

    pub fn with_shared(mut self, capability: Arc<dyn Capability>) -> Self {
        self.layers.push(capability);
        self
    }

    /// Fold capabilities left to right: the first is innermost.
    pub fn fold<I>(self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Capability>>,
    {
        capabilities.into_iter().fold(self, Composition::with_shared)
    }

    pub fn has(&self, name: &str) -> bool {
        self.layers.iter().any(|layer| layer.name() == name)
    }

    /// Layer names, innermost first.
    pub fn names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    pub fn spec(&self) -> crate::model::Spec {
        crate::model::Spec::with_composition(self.clone())
    }

    pub(crate) fn outermost(&self) -> Next<'_> {
        Next::new(&self.layers)
    }
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Build a composition from the base layer and `capabilities`, in order.
pub fn compose<I>(capabilities: I) -> Composition
where
    I: IntoIterator<Item = Arc<dyn Capability>>,
{
    Composition::base().fold(capabilities)
}

/// The three reference capabilities, fixtures innermost.
pub fn standard() -> Composition {
    Composition::base()
        .with(Fixtures)
        .with(Conditional)
        .with(Isolation)
}

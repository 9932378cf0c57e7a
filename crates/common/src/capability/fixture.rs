//! Fixture capability: per-topic setup and cleanup steps
//!
//! Fixture steps build a [`FixtureContext`] from the root topic down to the
//! test's own topic. Cleanup steps run from the test's topic back up to the
//! root, and within one topic the last registered step runs first.

use super::{Capability, Next};
use crate::builder::{Outcome, SpecBuilder};
use crate::context::FixtureContext;
use crate::lifecycle::{RunContext, TestRun};
use crate::model::{Implementation, TopicRef};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

type FixtureStep = Arc<dyn Fn(&mut FixtureContext) -> anyhow::Result<Option<FixtureContext>> + Send + Sync>;
type CleanupStep = Arc<dyn Fn(&FixtureContext) -> anyhow::Result<()> + Send + Sync>;

/// Steps declared on one topic.
#[derive(Default)]
pub struct FixtureSteps {
    fixtures: Vec<FixtureStep>,
    cleanups: Vec<CleanupStep>,
}

impl FixtureSteps {
    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    pub fn cleanup_count(&self) -> usize {
        self.cleanups.len()
    }
}

/// What a fixture step may return. `()` and `None` keep the context the step
/// was given, including any changes it made in place; a context replaces it.
pub trait FixtureOutput {
    fn into_context(self) -> anyhow::Result<Option<FixtureContext>>;
}

impl FixtureOutput for () {
    fn into_context(self) -> anyhow::Result<Option<FixtureContext>> {
        Ok(None)
    }
}

impl FixtureOutput for FixtureContext {
    fn into_context(self) -> anyhow::Result<Option<FixtureContext>> {
        Ok(Some(self))
    }
}

impl FixtureOutput for Option<FixtureContext> {
    fn into_context(self) -> anyhow::Result<Option<FixtureContext>> {
        Ok(self)
    }
}

impl<T: FixtureOutput> FixtureOutput for anyhow::Result<T> {
    fn into_context(self) -> anyhow::Result<Option<FixtureContext>> {
        self?.into_context()
    }
}

/// Declares fixture and cleanup steps on the current topic.
///
/// Steps apply to every test of the topic and of all its subtopics. Outside a
/// topic, or on a spec composed without [`Fixtures`], declarations are ignored.
pub trait FixtureBuilderExt {
    fn fixture<F, O>(&mut self, step: F)
    where
        F: Fn(&mut FixtureContext) -> O + Send + Sync + 'static,
        O: FixtureOutput;

    fn cleanup<F, O>(&mut self, step: F)
    where
        F: Fn(&FixtureContext) -> O + Send + Sync + 'static,
        O: Outcome;

    fn before<F, O>(&mut self, step: F)
    where
        F: Fn(&mut FixtureContext) -> O + Send + Sync + 'static,
        O: FixtureOutput,
    {
        self.fixture(step)
    }

    fn setup<F, O>(&mut self, step: F)
    where
        F: Fn(&mut FixtureContext) -> O + Send + Sync + 'static,
        O: FixtureOutput,
    {
        self.fixture(step)
    }

    fn after<F, O>(&mut self, step: F)
    where
        F: Fn(&FixtureContext) -> O + Send + Sync + 'static,
        O: Outcome,
    {
        self.cleanup(step)
    }

    fn teardown<F, O>(&mut self, step: F)
    where
        F: Fn(&FixtureContext) -> O + Send + Sync + 'static,
        O: Outcome,
    {
        self.cleanup(step)
    }
}

impl SpecBuilder<'_> {
    fn fixture_steps(&mut self) -> Option<&mut FixtureSteps> {
        if !self.spec().composition().has(Fixtures::NAME) {
            warn!("fixture steps declared on a spec without the fixtures capability");
            return None;
        }
        match self.current_extensions_mut() {
            Some(extensions) => Some(extensions.get_or_insert_default::<FixtureSteps>()),
            None => {
                debug!("ignoring fixture step declared outside any topic");
                None
            }
        }
    }
}

impl FixtureBuilderExt for SpecBuilder<'_> {
    fn fixture<F, O>(&mut self, step: F)
    where
        F: Fn(&mut FixtureContext) -> O + Send + Sync + 'static,
        O: FixtureOutput,
    {
        if let Some(steps) = self.fixture_steps() {
            steps.fixtures.push(Arc::new(move |context| step(context).into_context()));
        }
    }

    fn cleanup<F, O>(&mut self, step: F)
    where
        F: Fn(&FixtureContext) -> O + Send + Sync + 'static,
        O: Outcome,
    {
        if let Some(steps) = self.fixture_steps() {
            steps.cleanups.push(Arc::new(move |context| step(context).into_outcome()));
        }
    }
}

/// Build the fixture context for tests of `topic`.
pub fn create_context(topic: TopicRef<'_>) -> anyhow::Result<FixtureContext> {
    let mut context = FixtureContext::new();
    for ancestor in topic.lineage() {
        let Some(steps) = ancestor.extensions().get::<FixtureSteps>() else {
            continue;
        };
        for step in &steps.fixtures {
            if let Some(replacement) = step(&mut context)? {
                context = replacement;
            }
        }
    }
    Ok(context)
}

/// Run cleanup steps for `topic` and its ancestors.
///
/// Every step runs even if an earlier one fails; the first failure is
/// returned.
pub fn dispose_context(topic: TopicRef<'_>, context: &FixtureContext) -> anyhow::Result<()> {
    let mut first_failure = None;
    for ancestor in topic.lineage().into_iter().rev() {
        let Some(steps) = ancestor.extensions().get::<FixtureSteps>() else {
            continue;
        };
        for step in steps.cleanups.iter().rev() {
            if let Err(error) = step(context) {
                warn!(topic = %ancestor.behavior_text(), error = ?error, "cleanup step failed");
                first_failure.get_or_insert(error);
            }
        }
    }
    match first_failure {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

struct ActiveFixture(FixtureContext);

/// The fixture capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fixtures;

impl Fixtures {
    pub const NAME: &'static str = "fixtures";
}

#[async_trait]
impl Capability for Fixtures {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn wind_up(&self, run: &TestRun<'_>, context: RunContext, next: Next<'_>) -> anyhow::Result<RunContext> {
        let mut context = next.wind_up(run, context).await?;
        let fixture = create_context(run.test.topic())?;
        debug!(test = %run.behavior_text(), values = fixture.len(), "fixture context ready");

        let inner = context.implementation.clone();
        let shared = fixture.clone();
        context.implementation = Implementation::from_boxed(move |_| inner.call(shared.clone()));
        context.extensions.insert(ActiveFixture(fixture));
        Ok(context)
    }

    async fn wind_down(&self, run: &TestRun<'_>, context: &mut RunContext, next: Next<'_>) -> anyhow::Result<()> {
        next.wind_down(run, context).await?;
        match context.extensions.remove::<ActiveFixture>() {
            Some(ActiveFixture(fixture)) => dispose_context(run.test.topic(), &fixture),
            None => Ok(()),
        }
    }
}

//! Tree construction through `describe` and `it`
//!
//! The "current topic" lives in the [`SpecBuilder`] handed to each factory,
//! never in the spec itself. Nested factories get a builder pointing at the
//! new topic and the previous topic is restored when the factory returns,
//! panics or fails.

use crate::context::{Extensions, FixtureContext};
use crate::model::{Implementation, Spec, TestConfig, TestId, TopicId, TopicRef};
use crate::result::TestError;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// What a `describe` factory or cleanup step may return.
pub trait Outcome {
    fn into_outcome(self) -> anyhow::Result<()>;
}

impl Outcome for () {
    fn into_outcome(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E: Into<anyhow::Error>> Outcome for Result<(), E> {
    fn into_outcome(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

/// Mutable view of a spec during tree construction.
pub struct SpecBuilder<'s> {
    spec: &'s mut Spec,
    current: Option<TopicId>,
}

impl Spec {
    /// Declare a top-level topic.
    ///
    /// The first call creates the root topic. Later calls augment that root,
    /// so a spec always has exactly one.
    pub fn describe<R, F>(&mut self, description: impl Into<String>, factory: F) -> &mut Self
    where
        R: Outcome,
        F: FnOnce(&mut SpecBuilder<'_>) -> R,
    {
        SpecBuilder::new(self).describe(description, factory);
        self
    }

    /// Outside any topic this does nothing, matching `it` at top level.
    pub fn it<F, Fut>(&mut self, description: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(FixtureContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        SpecBuilder::new(self).it(description, f);
        self
    }
}

impl<'s> SpecBuilder<'s> {
    pub fn new(spec: &'s mut Spec) -> Self {
        Self { spec, current: None }
    }

    pub fn spec(&self) -> &Spec {
        self.spec
    }

    pub fn current_topic(&self) -> Option<TopicRef<'_>> {
        self.current.map(|id| self.spec.topic(id))
    }

    /// Capability storage of the current topic, if any.
    pub fn current_extensions_mut(&mut self) -> Option<&mut Extensions> {
        let id = self.current?;
        Some(&mut self.spec.topic_data_mut(id).extensions)
    }

    pub fn describe<R, F>(&mut self, description: impl Into<String>, factory: F)
    where
        R: Outcome,
        F: FnOnce(&mut SpecBuilder<'_>) -> R,
    {
        let description = description.into();
        let topic = match self.current {
            Some(parent) => self.spec.add_topic(parent, description.clone()),
            None => match self.spec.root_id() {
                Some(root) => {
                    debug!(topic = %description, "augmenting existing root topic");
                    root
                }
                None => self.spec.create_root(description.clone()),
            },
        };

        let previous = self.current.replace(topic);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| factory(&mut *self).into_outcome()));
        self.current = previous;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!(topic = %description, error = ?error, "error invoking topic");
            }
            Err(payload) => {
                let error = TestError::from_panic(payload);
                warn!(topic = %description, error = %error, "error invoking topic");
            }
        }
    }

    pub fn it<F, Fut>(&mut self, description: impl Into<String>, f: F)
    where
        F: Fn(FixtureContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.test(description, Implementation::new(f), TestConfig::default());
    }

    pub fn it_with<F, Fut>(&mut self, description: impl Into<String>, config: TestConfig, f: F)
    where
        F: Fn(FixtureContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.test(description, Implementation::new(f), config);
    }

    /// Append a test to the current topic. Without one, the call is ignored.
    pub fn test(
        &mut self,
        description: impl Into<String>,
        implementation: Implementation,
        config: TestConfig,
    ) -> Option<TestId> {
        let description = description.into();
        match self.current {
            Some(topic) => Some(self.spec.add_test(topic, description, implementation, config)),
            None => {
                debug!(test = %description, "ignoring test declared outside any topic");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pass(_: FixtureContext) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_nested_describe_builds_tree() {
        let mut spec = Spec::new();
        spec.describe("a", |s| {
            s.it("t1", pass);
            s.describe("b", |s| {
                s.it("t2", pass);
            });
            s.it("t3", pass);
        });

        let root = spec.root().unwrap();
        assert_eq!(root.description(), "a");
        assert_eq!(root.tests().count(), 2);
        assert_eq!(root.topics().next().unwrap().description(), "b");
        assert_eq!(spec.total_test_count(), 3);
    }

    #[test]
    fn test_it_outside_describe_is_ignored() {
        let mut spec = Spec::new();
        spec.it("orphan", pass);
        assert_eq!(spec.total_test_count(), 0);
        assert!(spec.root().is_none());
    }

    #[test]
    fn test_failing_factory_keeps_siblings() {
        let mut spec = Spec::new();
        spec.describe("a", |s| {
            s.describe("broken", |s| -> anyhow::Result<()> {
                s.it("before failure", pass);
                anyhow::bail!("factory failed")
            });
            s.describe("panicking", |s| -> () {
                s.it("before panic", pass);
                panic!("factory panicked");
            });
            s.it("after", pass);
        });

        let root = spec.root().unwrap();
        assert_eq!(root.topics().count(), 2);
        assert_eq!(root.tests().next().unwrap().description(), "after");
        assert_eq!(spec.total_test_count(), 3);
    }

    #[test]
    fn test_second_top_level_describe_augments_root() {
        let mut spec = Spec::new();
        spec.describe("a", |s| s.it("t1", pass));
        spec.describe("ignored", |s| s.it("t2", pass));

        let root = spec.root().unwrap();
        assert_eq!(root.description(), "a");
        assert_eq!(root.tests().count(), 2);
    }
}

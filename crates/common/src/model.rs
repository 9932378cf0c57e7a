//! Entity model: specs own an arena of topics and tests
//!
//! Topics and tests are addressed by index into their owning [`Spec`]. Parent
//! links are plain ids, so a child can reconstruct its path and behavior text
//! without holding a reference to the parent.

use crate::capability::Composition;
use crate::context::{Extensions, FixtureContext};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Default per-test time budget in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TopicId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TestId(pub(crate) usize);

type ImplementationFn = dyn Fn(FixtureContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// A test body. Always receives the fixture context; bodies that need none
/// simply ignore it.
#[derive(Clone)]
pub struct Implementation(Arc<ImplementationFn>);

impl Implementation {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(FixtureContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self(Arc::new(move |context| Box::pin(f(context))))
    }

    /// Wrap a synchronous body.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(FixtureContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(move |context| {
            let outcome = f(context);
            Box::pin(async move { outcome })
        }))
    }

    pub fn from_boxed<F>(f: F) -> Self
    where
        F: Fn(FixtureContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn noop() -> Self {
        Self::from_fn(|_| Ok(()))
    }

    pub fn call(&self, context: FixtureContext) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.0)(context)
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Implementation(..)")
    }
}

/// Predicate deciding whether a conditional test runs.
#[derive(Clone)]
pub struct Condition(Arc<dyn Fn() -> anyhow::Result<bool> + Send + Sync>);

impl Condition {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(move || Ok(f())))
    }

    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn evaluate(&self) -> anyhow::Result<bool> {
        (self.0)()
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Condition(..)")
    }
}

/// Per-test configuration, fixed at declaration time.
///
/// `timeout` is the base field; `isolated` and `condition` are read by the
/// isolation and conditional capabilities. The condition is not part of the
/// wire shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub isolated: bool,
    #[serde(skip)]
    pub condition: Option<Condition>,
}

impl TestConfig {
    pub fn with_timeout(mut self, ms: u64) -> Self {
        self.timeout = Some(ms);
        self
    }

    pub fn with_isolation(mut self) -> Self {
        self.isolated = true;
        self
    }

    pub fn with_condition<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Condition::new(f));
        self
    }

    pub fn with_fallible_condition<F>(mut self, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.condition = Some(Condition::fallible(f));
        self
    }
}

#[derive(Debug)]
pub struct Topic {
    pub(crate) description: String,
    pub(crate) parent: Option<TopicId>,
    pub(crate) index_in_parent: usize,
    pub(crate) tests: Vec<TestId>,
    pub(crate) topics: Vec<TopicId>,
    pub(crate) extensions: Extensions,
}

#[derive(Debug)]
pub struct Test {
    pub(crate) description: String,
    pub(crate) implementation: Implementation,
    pub(crate) config: TestConfig,
    pub(crate) topic: TopicId,
    pub(crate) index_in_topic: usize,
}

/// Root container of one topic tree.
///
/// The capability composition is fixed when the spec is created; every topic
/// and test the spec builds runs through it.
#[derive(Debug)]
pub struct Spec {
    composition: Composition,
    topics: Vec<Topic>,
    tests: Vec<Test>,
    root: Option<TopicId>,
}

impl Default for Spec {
    fn default() -> Self {
        Self::new()
    }
}

impl Spec {
    /// A spec with only the base lifecycle behavior.
    pub fn new() -> Self {
        Self::with_composition(Composition::base())
    }

    pub fn with_composition(composition: Composition) -> Self {
        Self {
            composition,
            topics: Vec::new(),
            tests: Vec::new(),
            root: None,
        }
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn root(&self) -> Option<TopicRef<'_>> {
        self.root.map(|id| self.topic(id))
    }

    /// Description of the root topic, if one has been declared.
    pub fn description(&self) -> Option<&str> {
        self.root.map(|id| self.topics[id.0].description.as_str())
    }

    pub fn topic(&self, id: TopicId) -> TopicRef<'_> {
        TopicRef { spec: self, id }
    }

    pub fn test(&self, id: TestId) -> TestRef<'_> {
        TestRef { spec: self, id }
    }

    /// Depth-first, tests before subtopics, declaration order.
    pub fn tests(&self) -> TestsDepthFirst<'_> {
        TestsDepthFirst::new(self, self.root)
    }

    pub fn total_test_count(&self) -> usize {
        self.root().map(|root| root.total_test_count()).unwrap_or(0)
    }

    pub(crate) fn root_id(&self) -> Option<TopicId> {
        self.root
    }

    pub(crate) fn create_root(&mut self, description: String) -> TopicId {
        let id = self.push_topic(description, None, 0);
        self.root = Some(id);
        id
    }

    pub(crate) fn add_topic(&mut self, parent: TopicId, description: String) -> TopicId {
        let index = self.topics[parent.0].topics.len();
        let id = self.push_topic(description, Some(parent), index);
        self.topics[parent.0].topics.push(id);
        id
    }

    pub(crate) fn add_test(
        &mut self,
        topic: TopicId,
        description: String,
        implementation: Implementation,
        config: TestConfig,
    ) -> TestId {
        let id = TestId(self.tests.len());
        let index_in_topic = self.topics[topic.0].tests.len();
        self.tests.push(Test {
            description,
            implementation,
            config,
            topic,
            index_in_topic,
        });
        self.topics[topic.0].tests.push(id);
        id
    }

    pub(crate) fn topic_data(&self, id: TopicId) -> &Topic {
        &self.topics[id.0]
    }

    pub(crate) fn topic_data_mut(&mut self, id: TopicId) -> &mut Topic {
        &mut self.topics[id.0]
    }

    pub(crate) fn test_data(&self, id: TestId) -> &Test {
        &self.tests[id.0]
    }

    fn push_topic(&mut self, description: String, parent: Option<TopicId>, index_in_parent: usize) -> TopicId {
        let id = TopicId(self.topics.len());
        self.topics.push(Topic {
            description,
            parent,
            index_in_parent,
            tests: Vec::new(),
            topics: Vec::new(),
            extensions: Extensions::new(),
        });
        id
    }
}

/// Borrowed view of a topic within its spec.
#[derive(Clone, Copy)]
pub struct TopicRef<'a> {
    spec: &'a Spec,
    id: TopicId,
}

impl<'a> TopicRef<'a> {
    pub fn id(&self) -> TopicId {
        self.id
    }

    pub fn spec(&self) -> &'a Spec {
        self.spec
    }

    pub fn description(&self) -> &'a str {
        &self.data().description
    }

    pub fn parent(&self) -> Option<TopicRef<'a>> {
        self.data().parent.map(|id| self.spec.topic(id))
    }

    /// Position among the parent's subtopics. Zero for a root topic.
    pub fn index(&self) -> usize {
        self.data().index_in_parent
    }

    /// Ancestor descriptions joined by spaces, ending with this topic's own.
    pub fn behavior_text(&self) -> String {
        match self.parent() {
            Some(parent) => format!("{} {}", parent.behavior_text(), self.description()),
            None => self.description().to_string(),
        }
    }

    pub fn tests(&self) -> impl Iterator<Item = TestRef<'a>> + 'a {
        let spec = self.spec;
        self.data().tests.iter().map(move |id| spec.test(*id))
    }

    pub fn topics(&self) -> impl Iterator<Item = TopicRef<'a>> + 'a {
        let spec = self.spec;
        self.data().topics.iter().map(move |id| spec.topic(*id))
    }

    pub fn tests_depth_first(&self) -> TestsDepthFirst<'a> {
        TestsDepthFirst::new(self.spec, Some(self.id))
    }

    pub fn total_test_count(&self) -> usize {
        self.data().tests.len() + self.topics().map(|topic| topic.total_test_count()).sum::<usize>()
    }

    /// This topic and its ancestors, from the root down.
    pub fn lineage(&self) -> Vec<TopicRef<'a>> {
        let mut lineage = vec![*self];
        let mut cursor = self.parent();
        while let Some(topic) = cursor {
            lineage.push(topic);
            cursor = topic.parent();
        }
        lineage.reverse();
        lineage
    }

    pub fn extensions(&self) -> &'a Extensions {
        &self.data().extensions
    }

    fn data(&self) -> &'a Topic {
        self.spec.topic_data(self.id)
    }
}

impl PartialEq for TopicRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.spec, other.spec) && self.id == other.id
    }
}

impl fmt::Debug for TopicRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicRef")
            .field("id", &self.id)
            .field("description", &self.description())
            .finish()
    }
}

/// Borrowed view of a test within its spec.
#[derive(Clone, Copy)]
pub struct TestRef<'a> {
    spec: &'a Spec,
    id: TestId,
}

impl<'a> TestRef<'a> {
    pub fn id(&self) -> TestId {
        self.id
    }

    pub fn spec(&self) -> &'a Spec {
        self.spec
    }

    pub fn description(&self) -> &'a str {
        &self.data().description
    }

    pub fn topic(&self) -> TopicRef<'a> {
        self.spec.topic(self.data().topic)
    }

    /// Position among the owning topic's tests.
    pub fn index(&self) -> usize {
        self.data().index_in_topic
    }

    pub fn behavior_text(&self) -> String {
        format!("{} {}", self.topic().behavior_text(), self.description())
    }

    pub fn config(&self) -> &'a TestConfig {
        &self.data().config
    }

    pub fn implementation(&self) -> &'a Implementation {
        &self.data().implementation
    }

    fn data(&self) -> &'a Test {
        self.spec.test_data(self.id)
    }
}

impl PartialEq for TestRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.spec, other.spec) && self.id == other.id
    }
}

impl fmt::Debug for TestRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRef")
            .field("id", &self.id)
            .field("description", &self.description())
            .finish()
    }
}

/// Restartable depth-first walk over the tests under a topic.
#[derive(Clone)]
pub struct TestsDepthFirst<'a> {
    spec: &'a Spec,
    pending: std::slice::Iter<'a, TestId>,
    stack: Vec<TopicId>,
}

impl<'a> TestsDepthFirst<'a> {
    fn new(spec: &'a Spec, start: Option<TopicId>) -> Self {
        Self {
            spec,
            pending: [].iter(),
            stack: start.into_iter().collect(),
        }
    }
}

impl<'a> Iterator for TestsDepthFirst<'a> {
    type Item = TestRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.pending.next() {
                return Some(self.spec.test(*id));
            }
            let topic = self.spec.topic_data(self.stack.pop()?);
            self.stack.extend(topic.topics.iter().rev().copied());
            self.pending = topic.tests.iter();
        }
    }
}

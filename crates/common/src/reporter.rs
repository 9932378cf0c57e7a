//! Reporter event bus
//!
//! The suite emits lifecycle events through one entry point,
//! [`ReporterBus::report`], which routes each event to the matching optional
//! callback of a [`Reporter`] sink. A disabled bus drops every event.

use crate::model::{Spec, TestRef};
use crate::result::{TestError, TestResult};
use crate::suite::Suite;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Sink for suite lifecycle events. Every callback is optional.
#[allow(unused_variables)]
pub trait Reporter: Send {
    fn on_suite_start(&mut self, suite: &Suite) {}

    fn on_suite_end(&mut self, suite: &Suite) {}

    fn on_spec_start(&mut self, spec: &Spec, suite: &Suite) {}

    fn on_spec_end(&mut self, spec: &Spec, suite: &Suite) {}

    fn on_test_start(&mut self, test: TestRef<'_>, suite: &Suite) {}

    fn on_test_end(&mut self, result: &TestResult, test: TestRef<'_>, suite: &Suite) {}

    fn on_unexpected_error(&mut self, message: &str, error: &TestError, suite: &Suite) {}
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn on_suite_start(&mut self, suite: &Suite) {
        (**self).on_suite_start(suite)
    }

    fn on_suite_end(&mut self, suite: &Suite) {
        (**self).on_suite_end(suite)
    }

    fn on_spec_start(&mut self, spec: &Spec, suite: &Suite) {
        (**self).on_spec_start(spec, suite)
    }

    fn on_spec_end(&mut self, spec: &Spec, suite: &Suite) {
        (**self).on_spec_end(spec, suite)
    }

    fn on_test_start(&mut self, test: TestRef<'_>, suite: &Suite) {
        (**self).on_test_start(test, suite)
    }

    fn on_test_end(&mut self, result: &TestResult, test: TestRef<'_>, suite: &Suite) {
        (**self).on_test_end(result, test, suite)
    }

    fn on_unexpected_error(&mut self, message: &str, error: &TestError, suite: &Suite) {
        (**self).on_unexpected_error(message, error, suite)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ReporterEvent<'a> {
    SuiteStart,
    SuiteEnd,
    SpecStart(&'a Spec),
    SpecEnd(&'a Spec),
    TestStart(TestRef<'a>),
    TestEnd(&'a TestResult, TestRef<'a>),
    UnexpectedError(&'a str, &'a TestError),
}

impl ReporterEvent<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            ReporterEvent::SuiteStart => "suiteStart",
            ReporterEvent::SuiteEnd => "suiteEnd",
            ReporterEvent::SpecStart(_) => "specStart",
            ReporterEvent::SpecEnd(_) => "specEnd",
            ReporterEvent::TestStart(_) => "testStart",
            ReporterEvent::TestEnd(..) => "testEnd",
            ReporterEvent::UnexpectedError(..) => "unexpectedError",
        }
    }
}

/// A reporter plus its `disabled` switch.
pub struct ReporterBus {
    sink: Box<dyn Reporter>,
    pub disabled: bool,
}

impl ReporterBus {
    pub fn new<R: Reporter + 'static>(sink: R) -> Self {
        Self {
            sink: Box::new(sink),
            disabled: false,
        }
    }

    /// Route one event. Returns whether it was dispatched.
    pub fn report(&mut self, event: ReporterEvent<'_>, suite: &Suite) -> bool {
        if self.disabled {
            return false;
        }
        let sink = self.sink.as_mut();
        match event {
            ReporterEvent::SuiteStart => sink.on_suite_start(suite),
            ReporterEvent::SuiteEnd => sink.on_suite_end(suite),
            ReporterEvent::SpecStart(spec) => sink.on_spec_start(spec, suite),
            ReporterEvent::SpecEnd(spec) => sink.on_spec_end(spec, suite),
            ReporterEvent::TestStart(test) => sink.on_test_start(test, suite),
            ReporterEvent::TestEnd(result, test) => sink.on_test_end(result, test, suite),
            ReporterEvent::UnexpectedError(message, error) => sink.on_unexpected_error(message, error, suite),
        }
        true
    }
}

impl fmt::Debug for ReporterBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReporterBus").field("disabled", &self.disabled).finish()
    }
}

/// Default sink: lifecycle events as tracing records.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn on_suite_start(&mut self, suite: &Suite) {
        info!(tests = suite.total_test_count(), "suite started");
    }

    fn on_suite_end(&mut self, _suite: &Suite) {
        info!("suite finished");
    }

    fn on_spec_start(&mut self, spec: &Spec, _suite: &Suite) {
        info!(spec = spec.description().unwrap_or_default(), "spec started");
    }

    fn on_test_end(&mut self, result: &TestResult, _test: TestRef<'_>, _suite: &Suite) {
        if result.is_skipped() {
            info!(test = %result.behavior_text, "skipped");
        } else if result.passed {
            info!(test = %result.behavior_text, isolated = result.is_isolated(), "passed");
        } else {
            warn!(
                test = %result.behavior_text,
                error = result.error.as_ref().map(TestError::message).unwrap_or_default(),
                "failed"
            );
        }
    }

    fn on_unexpected_error(&mut self, message: &str, error: &TestError, _suite: &Suite) {
        error!(error = %error, "{}", message);
    }
}

#[derive(Debug, Default)]
struct Collected {
    events: Vec<String>,
    specs: Vec<Vec<TestResult>>,
    unexpected: Vec<(String, TestError)>,
}

/// Accumulates results per spec. Clones share the same storage, so a handle
/// can be kept while the suite owns the sink.
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    inner: Arc<Mutex<Collected>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// All results, flattened in run order.
    pub fn results(&self) -> Vec<TestResult> {
        self.inner.lock().specs.iter().flatten().cloned().collect()
    }

    /// Results grouped by spec.
    pub fn spec_results(&self) -> Vec<Vec<TestResult>> {
        self.inner.lock().specs.clone()
    }

    /// Event log as `kind` or `kind: label` entries.
    pub fn events(&self) -> Vec<String> {
        self.inner.lock().events.clone()
    }

    pub fn unexpected_errors(&self) -> Vec<(String, TestError)> {
        self.inner.lock().unexpected.clone()
    }
}

impl Reporter for CollectingReporter {
    fn on_suite_start(&mut self, _suite: &Suite) {
        self.inner.lock().events.push("suiteStart".to_string());
    }

    fn on_suite_end(&mut self, _suite: &Suite) {
        self.inner.lock().events.push("suiteEnd".to_string());
    }

    fn on_spec_start(&mut self, spec: &Spec, _suite: &Suite) {
        let mut inner = self.inner.lock();
        inner
            .events
            .push(format!("specStart: {}", spec.description().unwrap_or_default()));
        inner.specs.push(Vec::new());
    }

    fn on_spec_end(&mut self, spec: &Spec, _suite: &Suite) {
        self.inner
            .lock()
            .events
            .push(format!("specEnd: {}", spec.description().unwrap_or_default()));
    }

    fn on_test_start(&mut self, test: TestRef<'_>, _suite: &Suite) {
        self.inner.lock().events.push(format!("testStart: {}", test.behavior_text()));
    }

    fn on_test_end(&mut self, result: &TestResult, _test: TestRef<'_>, _suite: &Suite) {
        let mut inner = self.inner.lock();
        inner.events.push(format!("testEnd: {}", result.behavior_text));
        if inner.specs.is_empty() {
            inner.specs.push(Vec::new());
        }
        if let Some(current) = inner.specs.last_mut() {
            current.push(result.clone());
        }
    }

    fn on_unexpected_error(&mut self, message: &str, error: &TestError, _suite: &Suite) {
        let mut inner = self.inner.lock();
        inner.events.push(format!("unexpectedError: {}", message));
        inner.unexpected.push((message.to_string(), error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_bus_drops_events() {
        let collector = CollectingReporter::new();
        let suite = Suite::new(Vec::new());
        let mut bus = ReporterBus::new(collector.clone());
        assert!(bus.report(ReporterEvent::SuiteStart, &suite));
        bus.disabled = true;
        assert!(!bus.report(ReporterEvent::SuiteEnd, &suite));
        assert_eq!(collector.events(), vec!["suiteStart"]);
    }

    #[test]
    fn test_event_kinds() {
        let error = TestError::new("x");
        assert_eq!(ReporterEvent::SuiteStart.kind(), "suiteStart");
        assert_eq!(ReporterEvent::UnexpectedError("m", &error).kind(), "unexpectedError");
    }
}

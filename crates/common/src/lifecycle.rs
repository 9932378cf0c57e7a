//! Per-test lifecycle: wind-up, invoke, wind-down, post-process

use crate::context::{Extensions, FixtureContext};
use crate::model::{Implementation, TestRef};
use crate::result::{TestError, TestResult};
use crate::suite::Suite;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error};

/// Transient state of one run, threaded through every capability.
#[derive(Debug)]
pub struct RunContext {
    pub implementation: Implementation,
    pub extensions: Extensions,
}

impl RunContext {
    pub fn new(implementation: Implementation) -> Self {
        Self {
            implementation,
            extensions: Extensions::new(),
        }
    }
}

/// A test being run on behalf of a suite.
#[derive(Debug, Clone, Copy)]
pub struct TestRun<'a> {
    pub test: TestRef<'a>,
    pub suite: &'a Suite,
}

impl<'a> TestRun<'a> {
    pub fn new(test: TestRef<'a>, suite: &'a Suite) -> Self {
        Self { test, suite }
    }

    /// Configured timeout, falling back to the suite default.
    pub fn timeout_ms(&self) -> u64 {
        self.test
            .config()
            .timeout
            .filter(|ms| *ms > 0)
            .unwrap_or_else(|| self.suite.default_timeout_ms())
    }

    pub fn behavior_text(&self) -> String {
        self.test.behavior_text()
    }

    fn failed(&self, error: TestError) -> TestResult {
        TestResult::failed(self.behavior_text(), self.test.config().clone(), error)
    }
}

/// Drive one test through its capability stack.
///
/// A failed wind-up yields a failing result immediately, with neither
/// wind-down nor post-processing. Otherwise wind-down always runs, and its
/// own failures are reported out of band rather than changing the result.
pub async fn run(run: TestRun<'_>) -> TestResult {
    let layers = run.test.spec().composition().outermost();
    let initial = RunContext::new(run.test.implementation().clone());

    debug!(test = %run.behavior_text(), "winding up");
    let wound = AssertUnwindSafe(layers.wind_up(&run, initial)).catch_unwind().await;
    let mut context = match wound {
        Ok(Ok(context)) => context,
        Ok(Err(err)) => {
            error!(test = %run.behavior_text(), error = ?err, "error preparing test context");
            return run.failed(TestError::from_error(&err));
        }
        Err(payload) => {
            let err = TestError::from_panic(payload);
            error!(test = %run.behavior_text(), error = %err, "error preparing test context");
            return run.failed(err);
        }
    };

    debug!(test = %run.behavior_text(), timeout_ms = run.timeout_ms(), "running");
    let implementation = context.implementation.clone();
    let invocation = AssertUnwindSafe(async move { implementation.call(FixtureContext::default()).await })
        .catch_unwind()
        .await;
    let result = match invocation {
        Ok(Ok(())) => TestResult::passed(run.behavior_text(), run.test.config().clone()),
        Ok(Err(err)) => {
            debug!(test = %run.behavior_text(), error = %err, "test failed");
            run.failed(TestError::from_error(&err))
        }
        Err(payload) => run.failed(TestError::from_panic(payload)),
    };

    debug!(test = %run.behavior_text(), "winding down");
    let unwound = AssertUnwindSafe(layers.wind_down(&run, &mut context))
        .catch_unwind()
        .await;
    match unwound {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            run.suite
                .report_unexpected(format!("error winding down {}", run.behavior_text()), TestError::from_error(&err));
        }
        Err(payload) => {
            run.suite
                .report_unexpected(format!("error winding down {}", run.behavior_text()), TestError::from_panic(payload));
        }
    }

    layers.post_process(&run, &context, result)
}

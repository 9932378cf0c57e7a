//! Conditional capability: skip tests whose condition is false

use super::{Capability, Next};
use crate::lifecycle::{RunContext, TestRun};
use crate::model::Implementation;
use crate::result::{TestError, TestResult};
use async_trait::async_trait;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

/// Marks a run whose condition was not met.
pub(crate) struct Skipped;

/// Evaluates `TestConfig::condition` once, at wind-up.
///
/// A false condition swaps the implementation for a no-op and marks the
/// result skipped and not passed. A condition that fails or panics is
/// reported as an unexpected error and the test runs anyway.
#[derive(Debug, Default, Clone, Copy)]
pub struct Conditional;

impl Conditional {
    pub const NAME: &'static str = "conditional";

    fn should_skip(run: &TestRun<'_>) -> bool {
        let Some(condition) = &run.test.config().condition else {
            return false;
        };
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| condition.evaluate())) {
            Ok(Ok(satisfied)) => return !satisfied,
            Ok(Err(error)) => TestError::from_error(&error),
            Err(payload) => TestError::from_panic(payload),
        };
        run.suite.report_unexpected(
            format!("error evaluating condition for {}", run.behavior_text()),
            failure,
        );
        false
    }
}

#[async_trait]
impl Capability for Conditional {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn wind_up(&self, run: &TestRun<'_>, context: RunContext, next: Next<'_>) -> anyhow::Result<RunContext> {
        let skipped = Self::should_skip(run);
        let mut context = next.wind_up(run, context).await?;
        if skipped {
            debug!(test = %run.behavior_text(), "condition not met, skipping");
            context.implementation = Implementation::noop();
            context.extensions.insert(Skipped);
        }
        Ok(context)
    }

    fn post_process(&self, run: &TestRun<'_>, context: &RunContext, result: TestResult, next: Next<'_>) -> TestResult {
        let mut result = next.post_process(run, context, result);
        if context.extensions.contains::<Skipped>() {
            result.skipped = Some(true);
            result.passed = false;
        }
        result
    }
}

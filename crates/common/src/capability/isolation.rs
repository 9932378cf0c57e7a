//! Isolation capability: run `isolated` tests in a separate context

use super::conditional::Skipped;
use super::{Capability, Next};
use crate::address::SuiteAddress;
use crate::error::{Error, RemoteFailure};
use crate::isolation::{self, IsolationHost};
use crate::lifecycle::{RunContext, TestRun};
use crate::model::Implementation;
use crate::result::TestResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

struct Proxied;

/// Replaces the implementation of an isolated test with a proxy that
/// re-runs the test through the suite's isolation host.
///
/// Inside the isolated context itself the test runs directly, and a test
/// the conditional layer skipped is never proxied. The proxy is
/// installed outside the base time limit, so the handshake has no deadline
/// of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct Isolation;

impl Isolation {
    pub const NAME: &'static str = "isolation";
}

/// Runs the addressed test remotely and re-raises a remote failure here.
async fn run_proxied(host: Arc<dyn IsolationHost>, address: SuiteAddress) -> anyhow::Result<()> {
    let result = isolation::run_isolated(host.as_ref(), &address).await?;
    match result.error {
        Some(error) => Err(RemoteFailure(error).into()),
        None => Ok(()),
    }
}

#[async_trait]
impl Capability for Isolation {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn wind_up(&self, run: &TestRun<'_>, context: RunContext, next: Next<'_>) -> anyhow::Result<RunContext> {
        let mut context = next.wind_up(run, context).await?;
        if !run.test.config().isolated || run.suite.launch().isolated {
            return Ok(context);
        }
        // A skipped test has nothing to run remotely.
        if context.extensions.contains::<Skipped>() {
            return Ok(context);
        }

        let address = run.suite.get_address_for_test(run.test)?;
        let host = run.suite.isolation_host().cloned().ok_or(Error::NoIsolationHost)?;
        debug!(test = %run.behavior_text(), %address, "proxying isolated test");

        context.implementation = Implementation::new(move |_| run_proxied(host.clone(), address.clone()));
        context.extensions.insert(Proxied);
        Ok(context)
    }

    fn post_process(&self, run: &TestRun<'_>, context: &RunContext, result: TestResult, next: Next<'_>) -> TestResult {
        let mut result = next.post_process(run, context, result);
        if context.extensions.contains::<Proxied>() {
            result.isolated = Some(true);
        }
        result
    }
}

//! Isolation transport
//!
//! Runs one addressed test in a separate execution context. The exchange is
//! a fixed two-phase handshake:
//!
//! 1. The host spawns a context with launch parameters naming the address,
//!    marking it isolated and muting its reporter.
//! 2. The context signals readiness.
//! 3. The invoking side opens a private channel and hands one endpoint over.
//! 4. The context runs the test and posts exactly one serialized result.
//! 5. The invoking side tears the context down.
//!
//! Nothing here retries or times out. A context that stays alive without
//! ever answering stalls the waiting test.

pub mod thread;
#[cfg(unix)]
pub mod process;

use crate::address::SuiteAddress;
use crate::config::LaunchParams;
use crate::error::{Error, Result};
use crate::result::TestResult;
use crate::suite::Suite;
use async_trait::async_trait;
use tracing::{debug, info, warn};

pub use thread::{SuiteFactory, ThreadHost};
#[cfg(unix)]
pub use process::{ProcessHost, ProcessLink};

/// Creates isolated contexts.
#[async_trait]
pub trait IsolationHost: Send + Sync {
    async fn spawn(&self, params: LaunchParams) -> Result<Box<dyn IsolatedContext>>;
}

/// Invoking side of one isolated context.
#[async_trait]
pub trait IsolatedContext: Send {
    async fn wait_ready(&mut self) -> Result<()>;

    /// Create the private channel and transfer one endpoint into the context.
    async fn open_channel(&mut self) -> Result<Box<dyn ResultPort>>;

    async fn teardown(self: Box<Self>) -> Result<()>;
}

/// Retained endpoint of the private channel.
#[async_trait]
pub trait ResultPort: Send {
    async fn receive(&mut self) -> Result<TestResult>;
}

/// Isolated side of the handshake.
#[async_trait]
pub trait IsolationLink: Send {
    async fn signal_ready(&mut self) -> Result<()>;

    async fn accept_channel(&mut self) -> Result<Box<dyn ResultPoster>>;
}

/// Transferred endpoint of the private channel. Consumed by its single post.
#[async_trait]
pub trait ResultPoster: Send {
    async fn post(self: Box<Self>, result: &TestResult) -> Result<()>;
}

/// Run the test at `address` in a fresh context from `host`.
///
/// The context is torn down whatever the outcome of the exchange.
pub async fn run_isolated(host: &dyn IsolationHost, address: &SuiteAddress) -> Result<TestResult> {
    let params = LaunchParams::for_isolated(address)?;
    info!(%address, "starting isolated context");
    let mut context = host.spawn(params).await?;

    let exchange = async {
        context.wait_ready().await?;
        debug!(%address, "isolated context ready");
        let mut port = context.open_channel().await?;
        debug!(%address, "channel transferred, waiting for result");
        port.receive().await
    }
    .await;

    if let Err(e) = context.teardown().await {
        warn!(%address, error = %e, "failed to tear down isolated context");
    }

    match &exchange {
        Ok(result) => info!(%address, passed = result.passed, "isolated run finished"),
        Err(e) => warn!(%address, error = %e, "isolated run failed"),
    }
    exchange
}

/// Serve the isolated side: run the launch address's test and post its
/// result back.
pub async fn serve_isolated<L>(suite: &Suite, link: &mut L) -> Result<TestResult>
where
    L: IsolationLink + ?Sized,
{
    let address = suite.launch().suite_address.as_ref().ok_or(Error::MissingAddress)?;
    let test = suite.require_test(address)?;

    link.signal_ready().await?;
    let poster = link.accept_channel().await?;
    debug!(%address, "channel accepted, running test");

    let result = suite.run_test(test).await;
    poster.post(&result).await?;
    Ok(result)
}

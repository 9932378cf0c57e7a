//! Isolation on a dedicated OS thread
//!
//! Each context gets its own thread, its own single-threaded runtime and its
//! own freshly built [`Suite`]. The two sides share nothing but oneshot
//! channels, and the result crosses as JSON text.

use super::{serve_isolated, IsolatedContext, IsolationHost, IsolationLink, ResultPort, ResultPoster};
use crate::config::{LaunchConfig, LaunchParams};
use crate::error::{Error, Result};
use crate::result::TestResult;
use crate::suite::Suite;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Builds the suite for an isolated context from its launch configuration.
pub type SuiteFactory = Arc<dyn Fn(LaunchConfig) -> Suite + Send + Sync>;

#[derive(Clone)]
pub struct ThreadHost {
    factory: SuiteFactory,
}

impl ThreadHost {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(LaunchConfig) -> Suite + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
        }
    }
}

impl fmt::Debug for ThreadHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ThreadHost")
    }
}

#[async_trait]
impl IsolationHost for ThreadHost {
    async fn spawn(&self, params: LaunchParams) -> Result<Box<dyn IsolatedContext>> {
        let launch = LaunchConfig::from_params(&params)?;
        let (ready_tx, ready_rx) = oneshot::channel();
        let (channel_tx, channel_rx) = oneshot::channel();
        let factory = self.factory.clone();

        let handle = std::thread::Builder::new()
            .name("spectree-isolated".to_string())
            .spawn(move || -> Result<()> {
                let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
                runtime.block_on(async move {
                    let suite = factory(launch.clone()).with_launch(launch);
                    let mut link = ThreadLink {
                        ready: Some(ready_tx),
                        channel: Some(channel_rx),
                    };
                    serve_isolated(&suite, &mut link).await.map(|_| ())
                })
            })?;

        debug!(thread = ?handle.thread().id(), "spawned isolated thread");
        Ok(Box::new(ThreadContext {
            ready: Some(ready_rx),
            channel: Some(channel_tx),
            handle: Some(handle),
        }))
    }
}

struct ThreadContext {
    ready: Option<oneshot::Receiver<()>>,
    channel: Option<oneshot::Sender<oneshot::Sender<String>>>,
    handle: Option<JoinHandle<Result<()>>>,
}

#[async_trait]
impl IsolatedContext for ThreadContext {
    async fn wait_ready(&mut self) -> Result<()> {
        let ready = self
            .ready
            .take()
            .ok_or_else(|| Error::Protocol("readiness already awaited".to_string()))?;
        ready.await.map_err(|_| Error::ChannelClosed("readiness"))
    }

    async fn open_channel(&mut self) -> Result<Box<dyn ResultPort>> {
        let transfer = self
            .channel
            .take()
            .ok_or_else(|| Error::Protocol("channel already transferred".to_string()))?;
        let (endpoint, retained) = oneshot::channel();
        transfer
            .send(endpoint)
            .map_err(|_| Error::ChannelClosed("channel transfer"))?;
        Ok(Box::new(ThreadPort(Some(retained))))
    }

    async fn teardown(self: Box<Self>) -> Result<()> {
        let ThreadContext { ready, channel, handle } = *self;
        // Drop our channel ends so a context still waiting on them gives up.
        drop((ready, channel));
        let Some(handle) = handle else {
            return Ok(());
        };
        let joined = tokio::task::spawn_blocking(move || handle.join())
            .await
            .map_err(|e| Error::Internal(format!("join task failed: {}", e)))?;
        match joined {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("isolated thread panicked");
                Err(Error::Internal("isolated thread panicked".to_string()))
            }
        }
    }
}

struct ThreadPort(Option<oneshot::Receiver<String>>);

#[async_trait]
impl ResultPort for ThreadPort {
    async fn receive(&mut self) -> Result<TestResult> {
        let receiver = self
            .0
            .take()
            .ok_or_else(|| Error::Protocol("result already received".to_string()))?;
        let json = receiver.await.map_err(|_| Error::ChannelClosed("result"))?;
        TestResult::from_json(&json)
    }
}

struct ThreadLink {
    ready: Option<oneshot::Sender<()>>,
    channel: Option<oneshot::Receiver<oneshot::Sender<String>>>,
}

#[async_trait]
impl IsolationLink for ThreadLink {
    async fn signal_ready(&mut self) -> Result<()> {
        let ready = self
            .ready
            .take()
            .ok_or_else(|| Error::Protocol("readiness already signalled".to_string()))?;
        ready.send(()).map_err(|_| Error::ChannelClosed("readiness"))
    }

    async fn accept_channel(&mut self) -> Result<Box<dyn ResultPoster>> {
        let channel = self
            .channel
            .take()
            .ok_or_else(|| Error::Protocol("channel already accepted".to_string()))?;
        let endpoint = channel.await.map_err(|_| Error::ChannelClosed("channel transfer"))?;
        Ok(Box::new(ThreadPoster(endpoint)))
    }
}

struct ThreadPoster(oneshot::Sender<String>);

#[async_trait]
impl ResultPoster for ThreadPoster {
    async fn post(self: Box<Self>, result: &TestResult) -> Result<()> {
        let json = result.to_json()?;
        self.0.send(json).map_err(|_| Error::ChannelClosed("result"))
    }
}

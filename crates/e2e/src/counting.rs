//! Isolation host wrapper that counts handshake steps

use async_trait::async_trait;
use spectree_common::config::LaunchParams;
use spectree_common::isolation::{IsolatedContext, IsolationHost, ResultPort};
use spectree_common::{Result, TestResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// How many times each handshake step happened.
#[derive(Debug, Default)]
pub struct HandshakeCounts {
    pub spawned: AtomicUsize,
    pub ready: AtomicUsize,
    pub channels: AtomicUsize,
    pub results: AtomicUsize,
    pub teardowns: AtomicUsize,
    last_params: parking_lot::Mutex<Option<LaunchParams>>,
}

impl HandshakeCounts {
    /// `(spawned, ready, channels, results, teardowns)`
    pub fn snapshot(&self) -> (usize, usize, usize, usize, usize) {
        (
            self.spawned.load(Ordering::SeqCst),
            self.ready.load(Ordering::SeqCst),
            self.channels.load(Ordering::SeqCst),
            self.results.load(Ordering::SeqCst),
            self.teardowns.load(Ordering::SeqCst),
        )
    }

    /// Parameters of the most recent spawn.
    pub fn last_params(&self) -> Option<LaunchParams> {
        self.last_params.lock().clone()
    }
}

pub struct CountingHost<H> {
    inner: H,
    counts: Arc<HandshakeCounts>,
}

impl<H: IsolationHost> CountingHost<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            counts: Arc::new(HandshakeCounts::default()),
        }
    }

    pub fn counts(&self) -> Arc<HandshakeCounts> {
        self.counts.clone()
    }
}

#[async_trait]
impl<H: IsolationHost> IsolationHost for CountingHost<H> {
    async fn spawn(&self, params: LaunchParams) -> Result<Box<dyn IsolatedContext>> {
        self.counts.spawned.fetch_add(1, Ordering::SeqCst);
        *self.counts.last_params.lock() = Some(params.clone());
        let inner = self.inner.spawn(params).await?;
        Ok(Box::new(CountingContext {
            inner,
            counts: self.counts.clone(),
        }))
    }
}

struct CountingContext {
    inner: Box<dyn IsolatedContext>,
    counts: Arc<HandshakeCounts>,
}

#[async_trait]
impl IsolatedContext for CountingContext {
    async fn wait_ready(&mut self) -> Result<()> {
        self.inner.wait_ready().await?;
        self.counts.ready.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn open_channel(&mut self) -> Result<Box<dyn ResultPort>> {
        let inner = self.inner.open_channel().await?;
        self.counts.channels.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingPort {
            inner,
            counts: self.counts.clone(),
        }))
    }

    async fn teardown(self: Box<Self>) -> Result<()> {
        self.counts.teardowns.fetch_add(1, Ordering::SeqCst);
        self.inner.teardown().await
    }
}

struct CountingPort {
    inner: Box<dyn ResultPort>,
    counts: Arc<HandshakeCounts>,
}

#[async_trait]
impl ResultPort for CountingPort {
    async fn receive(&mut self) -> Result<TestResult> {
        let result = self.inner.receive().await?;
        self.counts.results.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }
}

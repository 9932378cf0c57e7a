//! Timing helpers

use crate::error::TimeoutError;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Resolve after `ms` milliseconds.
pub async fn time_passes(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// A defusable deadline.
///
/// Racing a future against the limit fails with [`TimeoutError`] once the
/// deadline passes, unless the limit was cancelled first. A cancelled limit
/// never fails: its expiry is swallowed and the raced future alone decides.
#[derive(Debug, Clone)]
pub struct TimeLimit {
    ms: u64,
    deadline: Instant,
    cancelled: Arc<AtomicBool>,
}

/// Start a time limit of `ms` milliseconds from now.
pub fn time_limit(ms: u64) -> TimeLimit {
    TimeLimit::new(ms)
}

impl TimeLimit {
    pub fn new(ms: u64) -> Self {
        Self {
            ms,
            deadline: Instant::now() + Duration::from_millis(ms),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn ms(&self) -> u64 {
        self.ms
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for the deadline. Resolves to `Ok` if the limit was cancelled in
    /// the meantime.
    pub async fn expired(&self) -> Result<(), TimeoutError> {
        tokio::time::sleep_until(self.deadline).await;
        if self.is_cancelled() {
            Ok(())
        } else {
            Err(TimeoutError { ms: self.ms })
        }
    }

    /// Run `work` against the deadline.
    pub async fn race<F>(&self, work: F) -> anyhow::Result<()>
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        tokio::pin!(work);
        tokio::select! {
            biased;
            outcome = &mut work => outcome,
            expiry = self.expired() => match expiry {
                Err(timeout) => Err(timeout.into()),
                Ok(()) => work.await,
            },
        }
    }
}

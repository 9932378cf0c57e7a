//! Call-order recording

use parking_lot::Mutex;
use spectree_common::{FixtureContext, Implementation};
use std::sync::Arc;

/// Shared, append-only log of named events.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|entry| *entry == event).count()
    }

    /// A fixture step that records `event`.
    pub fn fixture(&self, event: &str) -> impl Fn(&mut FixtureContext) + Send + Sync + 'static {
        let log = self.clone();
        let event = event.to_string();
        move |_: &mut FixtureContext| log.push(event.clone())
    }

    /// A cleanup step that records `event`.
    pub fn cleanup(&self, event: &str) -> impl Fn(&FixtureContext) + Send + Sync + 'static {
        let log = self.clone();
        let event = event.to_string();
        move |_: &FixtureContext| log.push(event.clone())
    }

    /// A passing test body that records `event`.
    pub fn test(&self, event: &str) -> Implementation {
        let log = self.clone();
        let event = event.to_string();
        Implementation::from_fn(move |_| {
            log.push(event.clone());
            Ok(())
        })
    }
}

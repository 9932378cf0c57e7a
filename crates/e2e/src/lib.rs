//! Spectree end-to-end test support
//!
//! Shared fixtures for the integration tests under `tests/`:
//!
//! - [`CallLog`] records the order in which steps and test bodies run
//! - [`CountingHost`] wraps an isolation host and counts every handshake step
//! - [`specs`] builds the suites the tests drive

pub mod counting;
pub mod recorder;
pub mod specs;

pub use counting::{CountingHost, HandshakeCounts};
pub use recorder::CallLog;

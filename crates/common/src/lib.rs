//! Spectree core library
//!
//! Test trees built from `describe`/`it` declarations, a composable
//! capability stack around each test's lifecycle, numeric test addressing
//! and an isolation transport that re-runs single tests in separate
//! execution contexts.

pub mod address;
pub mod builder;
pub mod capability;
pub mod config;
pub mod context;
pub mod error;
pub mod isolation;
pub mod lifecycle;
pub mod model;
pub mod reporter;
pub mod result;
pub mod suite;
pub mod util;

// Re-export commonly used types
pub use address::SuiteAddress;
pub use builder::{Outcome, SpecBuilder};
pub use capability::{compose, standard, Capability, Composition, Conditional, FixtureBuilderExt, Fixtures, Isolation};
pub use config::{LaunchConfig, LaunchParams, RunnerSettings};
pub use context::FixtureContext;
pub use error::{Error, RemoteFailure, Result, TimeoutError};
pub use isolation::{IsolationHost, ThreadHost};
#[cfg(unix)]
pub use isolation::{ProcessHost, ProcessLink};
pub use model::{Implementation, Spec, TestConfig, TestRef, TopicRef};
pub use reporter::{CollectingReporter, Reporter, ReporterEvent, TracingReporter};
pub use result::{TestError, TestResult};
pub use suite::{RunSummary, Suite};
pub use util::{time_limit, time_passes, TimeLimit};

/// Spectree version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

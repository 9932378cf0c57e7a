//! Error types for spectree

use crate::address::SuiteAddress;
use crate::result::TestError;
use thiserror::Error;

/// Result type alias using the spectree Error
pub type Result<T> = std::result::Result<T, Error>;

/// Spectree error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Invalid launch parameter {key}: {reason}")]
    InvalidLaunchParam { key: String, reason: String },

    #[error("Invalid suite address {0:?}")]
    InvalidAddress(String),

    #[error("No test at address {0}")]
    UnknownTest(SuiteAddress),

    #[error("Test does not belong to any spec in this suite")]
    ForeignTest,

    #[error("Isolated launch is missing a suite address")]
    MissingAddress,

    #[error("No isolation host configured for isolated test")]
    NoIsolationHost,

    #[error("Failed to spawn isolated context: {0}")]
    Spawn(String),

    #[error("Isolation protocol error: {0}")]
    Protocol(String),

    #[error("Isolation channel closed while waiting for {0}")]
    ChannelClosed(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A test implementation ran past its configured time budget.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Time ran out after {ms}ms")]
pub struct TimeoutError {
    pub ms: u64,
}

/// A failure reported back from an isolated context.
///
/// Its stack text is carried over unchanged into the invoking context's
/// result, since the original error value never crosses the boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("isolated test failed: {0}")]
pub struct RemoteFailure(pub TestError);

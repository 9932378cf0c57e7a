//! Test results and their transport-safe error representation

use crate::error::RemoteFailure;
use crate::model::TestConfig;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// A structured test failure.
///
/// Only the textual stack is kept. Arbitrary error values are not
/// serializable, and results have to survive an isolation boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{stack}")]
pub struct TestError {
    pub stack: String,
}

impl TestError {
    pub fn new(stack: impl Into<String>) -> Self {
        Self { stack: stack.into() }
    }

    /// Reduce an error chain to its stack text.
    ///
    /// Failures relayed from an isolated context keep the remote stack as is.
    pub fn from_error(error: &anyhow::Error) -> Self {
        if let Some(RemoteFailure(remote)) = error.downcast_ref::<RemoteFailure>() {
            return remote.clone();
        }
        Self {
            stack: format!("{:?}", error),
        }
    }

    /// Reduce a caught panic payload to stack text.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            stack: format!("panicked: {}", message),
        }
    }

    /// First line of the stack, suitable for one-line summaries.
    pub fn message(&self) -> &str {
        self.stack.lines().next().unwrap_or_default()
    }
}

/// The outcome of one test run.
///
/// Capabilities extend a result additively (`skipped`, `isolated`) in their
/// post-processing step. The serde shape doubles as the isolation wire
/// format: `error` is encoded as `false` when the test did not fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub behavior_text: String,
    pub config: TestConfig,
    pub passed: bool,
    #[serde(default, with = "error_or_false")]
    pub error: Option<TestError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolated: Option<bool>,
}

impl TestResult {
    pub fn passed(behavior_text: impl Into<String>, config: TestConfig) -> Self {
        Self {
            behavior_text: behavior_text.into(),
            config,
            passed: true,
            error: None,
            skipped: None,
            isolated: None,
        }
    }

    pub fn failed(behavior_text: impl Into<String>, config: TestConfig, error: TestError) -> Self {
        Self {
            behavior_text: behavior_text.into(),
            config,
            passed: false,
            error: Some(error),
            skipped: None,
            isolated: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.unwrap_or(false)
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated.unwrap_or(false)
    }

    /// Encode as a single JSON line for the wire.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

mod error_or_false {
    use super::TestError;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Field {
        Error(TestError),
        Flag(bool),
    }

    pub fn serialize<S: Serializer>(error: &Option<TestError>, serializer: S) -> Result<S::Ok, S::Error> {
        match error {
            Some(error) => error.serialize(serializer),
            None => serializer.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<TestError>, D::Error> {
        Ok(match Field::deserialize(deserializer)? {
            Field::Error(error) => Some(error),
            Field::Flag(false) => None,
            Field::Flag(true) => Some(TestError::new("unknown error")),
        })
    }
}

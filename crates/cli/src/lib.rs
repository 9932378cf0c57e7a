//! Spectree CLI
//!
//! Command-line harness for spectree suites: argument and environment
//! handling, console and JSON reporters, and the child side of process
//! isolation.

pub mod harness;
pub mod output;
pub mod selftest;

pub use harness::{run_main, HarnessArgs, IsolationMode};
pub use output::{ConsoleReporter, JsonReporter, OutputFormat};

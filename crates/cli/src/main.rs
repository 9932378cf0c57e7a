//! Spectree self-test
//!
//! Runs the built-in suite through the harness. Isolated tests re-execute
//! this binary.

fn main() {
    std::process::exit(spectree_cli::run_main(spectree_cli::selftest::specs));
}

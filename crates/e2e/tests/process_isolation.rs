//! Process isolation end to end
//!
//! This binary is both sides of the transport. Started normally it runs a
//! suite whose isolated tests re-execute this same binary; started with the
//! isolated launch parameters in its environment it serves one test over
//! stdio and exits.
//!
//! Run with: cargo test --package spectree-e2e --test process_isolation

use clap::Parser;
use spectree_common::isolation::serve_isolated;
use spectree_common::{
    standard, CollectingReporter, LaunchConfig, ProcessHost, ProcessLink, Spec, Suite, TestConfig, TestResult,
};
use spectree_e2e::CountingHost;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const PARENT_PID_VAR: &str = "SPECTREE_E2E_PARENT_PID";
const CHILD_FAILURE: &str = "child process reported failure";

#[derive(Parser, Debug, Default)]
#[command(name = "process-isolation")]
#[command(about = "Process isolation end-to-end check")]
struct Args {
    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn parent_pid() -> Option<u32> {
    std::env::var(PARENT_PID_VAR).ok()?.parse().ok()
}

fn build_specs() -> Vec<Spec> {
    let mut spec = standard().spec();
    spec.describe("process isolation", |s| {
        s.it_with("runs in a child process", TestConfig::default().with_isolation(), |_| async {
            // Interleaved output must not confuse the protocol reader.
            println!("plain output from the isolated test");
            let own = std::process::id();
            anyhow::ensure!(parent_pid() != Some(own), "ran in the parent process {}", own);
            Ok(())
        });
        s.it_with("fails in a child process", TestConfig::default().with_isolation(), |_| async {
            Err::<(), _>(anyhow::anyhow!("{} (pid {})", CHILD_FAILURE, std::process::id()))
        });
        s.it("runs in the parent process", |_| async {
            anyhow::ensure!(parent_pid() == Some(std::process::id()), "ran outside the parent process");
            Ok(())
        });
    });
    vec![spec]
}

fn main() {
    // Cargo may forward libtest flags this binary does not know.
    let args = Args::try_parse().unwrap_or_default();
    let level = if args.verbose { "debug" } else { "info" };

    // Stdout carries the isolation protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse().unwrap()))
        .init();

    let launch = match LaunchConfig::from_env() {
        Ok(launch) => launch,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    if !launch.isolated {
        std::env::set_var(PARENT_PID_VAR, std::process::id().to_string());
    }

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    let result = if launch.isolated {
        rt.block_on(child_main(launch))
    } else {
        rt.block_on(parent_main())
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!(error = ?e, "process isolation check failed");
            std::process::exit(1);
        }
    }
}

async fn child_main(launch: LaunchConfig) -> anyhow::Result<()> {
    let suite = Suite::new(build_specs()).with_launch(launch);
    let mut link = ProcessLink::stdio();
    let result = serve_isolated(&suite, &mut link).await?;
    info!(test = %result.behavior_text, passed = result.passed, "served isolated test");
    Ok(())
}

async fn parent_main() -> anyhow::Result<()> {
    let host = CountingHost::new(ProcessHost::current_exe(Vec::new())?);
    let counts = host.counts();
    let collector = CollectingReporter::new();

    let summary = Suite::new(build_specs())
        .with_isolation_host(Arc::new(host))
        .with_reporter(collector.clone())
        .run()
        .await?;

    let results = collector.results();
    let find = |text: &str| -> anyhow::Result<TestResult> {
        results
            .iter()
            .find(|r| r.behavior_text == format!("process isolation {}", text))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no result for {}", text))
    };

    let child = find("runs in a child process")?;
    anyhow::ensure!(child.passed, "isolated test failed: {:?}", child.error);
    anyhow::ensure!(child.isolated == Some(true), "isolated test not marked isolated");

    let failing = find("fails in a child process")?;
    let stack = failing.error.map(|e| e.stack).unwrap_or_default();
    anyhow::ensure!(!failing.passed, "failing isolated test passed");
    anyhow::ensure!(stack.contains(CHILD_FAILURE), "remote stack lost: {}", stack);
    anyhow::ensure!(
        !stack.contains(&format!("(pid {})", std::process::id())),
        "failure raised in the parent: {}",
        stack
    );

    let inline = find("runs in the parent process")?;
    anyhow::ensure!(inline.passed, "inline test failed: {:?}", inline.error);
    anyhow::ensure!(inline.isolated.is_none(), "inline test marked isolated");

    anyhow::ensure!(
        counts.snapshot() == (2, 2, 2, 2, 2),
        "unexpected handshake counts {:?}",
        counts.snapshot()
    );
    anyhow::ensure!((summary.passed, summary.failed) == (2, 1), "unexpected summary {:?}", summary);

    info!("process isolation: ok");
    Ok(())
}

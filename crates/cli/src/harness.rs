//! Executable harness around a suite
//!
//! A test binary hands [`run_main`] a function building its specs. The same
//! binary then serves three roles: listing tests, running the suite, and,
//! when started with isolated launch parameters, serving one isolated test
//! to its parent over stdio.

use crate::output::{self, OutputFormat, TestListing};
use anyhow::Context;
use clap::{Parser, ValueEnum};
use spectree_common::{IsolationHost, LaunchConfig, RunnerSettings, Spec, Suite, SuiteAddress, ThreadHost};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Where isolated tests run.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum IsolationMode {
    /// A child process re-executing this binary
    #[default]
    Process,
    /// A dedicated thread in this process
    Thread,
}

/// Spectree suite harness
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct HarnessArgs {
    /// Run only the test at this address (`spec/topic/...#test` or JSON)
    #[arg(short, long)]
    pub address: Option<SuiteAddress>,

    /// Run as the isolated target of a parent run (requires --address)
    #[arg(long, hide = true)]
    pub isolated: bool,

    /// Suppress reporter output
    #[arg(long)]
    pub no_report: bool,

    /// Runner settings file
    #[arg(short, long, env = "SPECTREE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "console")]
    pub format: OutputFormat,

    /// Where isolated tests run
    #[arg(long, default_value = "process")]
    pub isolation: IsolationMode,

    /// List tests with their addresses instead of running them
    #[arg(short, long)]
    pub list: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl HarnessArgs {
    /// Launch configuration from the environment, overridden by flags.
    pub fn launch_config(&self, from_env: LaunchConfig) -> anyhow::Result<LaunchConfig> {
        let launch = LaunchConfig {
            suite_address: self.address.clone().or(from_env.suite_address),
            isolated: self.isolated || from_env.isolated,
            disable_reporting: self.no_report || from_env.disable_reporting,
        };
        if launch.isolated && launch.suite_address.is_none() {
            anyhow::bail!(spectree_common::Error::MissingAddress);
        }
        Ok(launch)
    }

    pub fn settings(&self) -> anyhow::Result<RunnerSettings> {
        let path = match &self.config {
            Some(path) => {
                // Only the implicit default file may be absent.
                if !path.exists() {
                    anyhow::bail!("settings file {} not found", path.display());
                }
                path.clone()
            }
            None => {
                let default = PathBuf::from(RunnerSettings::FILE_NAME);
                if !default.exists() {
                    return Ok(RunnerSettings::default());
                }
                default
            }
        };
        RunnerSettings::load(&path).with_context(|| format!("loading {}", path.display()))
    }
}

/// Builds the specs of a suite. Called once per execution context.
pub type SpecFactory = Arc<dyn Fn(&LaunchConfig) -> Vec<Spec> + Send + Sync>;

/// Parse arguments, run, and return the process exit code.
///
/// `0` when every test passed or was skipped, `1` when any failed, `2` when
/// the harness itself could not run.
pub fn run_main<F>(build: F) -> i32
where
    F: Fn(&LaunchConfig) -> Vec<Spec> + Send + Sync + 'static,
{
    let args = HarnessArgs::parse();
    init_logging(args.verbose);

    match run(args, Arc::new(build)) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            2
        }
    }
}

/// Logs go to stderr: stdout carries reporter output, or the isolation
/// protocol in a child.
fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with_target(false)
        .init();
}

fn run(args: HarnessArgs, build: SpecFactory) -> anyhow::Result<bool> {
    let settings = args.settings()?;
    let launch = args.launch_config(LaunchConfig::from_env()?)?;
    debug!(?launch, ?settings, "harness starting");

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

    if launch.isolated {
        return runtime.block_on(serve_child(build, launch, &settings)).map(|_| true);
    }

    let suite = Suite::new(build(&launch))
        .with_settings(&settings)
        .with_isolation_host(isolation_host(&args, &settings, build.clone())?)
        .with_reporter(output::reporter(args.format))
        .with_launch(launch);

    if args.list {
        output::print_list(&TestListing::collect(&suite), args.format);
        return Ok(true);
    }

    let summary = runtime.block_on(suite.run())?;
    info!(passed = summary.passed, failed = summary.failed, "run complete");
    Ok(summary.is_success())
}

fn isolation_host(
    args: &HarnessArgs,
    settings: &RunnerSettings,
    build: SpecFactory,
) -> anyhow::Result<Arc<dyn IsolationHost>> {
    match args.isolation {
        IsolationMode::Thread => {
            let settings = settings.clone();
            Ok(Arc::new(ThreadHost::new(move |launch| {
                Suite::new(build(&launch)).with_settings(&settings)
            })))
        }
        IsolationMode::Process => process_host(args, settings),
    }
}

#[cfg(unix)]
fn process_host(args: &HarnessArgs, settings: &RunnerSettings) -> anyhow::Result<Arc<dyn IsolationHost>> {
    let mut isolation = settings.isolation.clone();
    // The child must resolve the same settings file as its parent.
    if let Some(config) = &args.config {
        isolation.args.push("--config".to_string());
        isolation.args.push(config.display().to_string());
    }
    Ok(Arc::new(spectree_common::ProcessHost::from_settings(&isolation)?))
}

#[cfg(not(unix))]
fn process_host(_args: &HarnessArgs, _settings: &RunnerSettings) -> anyhow::Result<Arc<dyn IsolationHost>> {
    anyhow::bail!("process isolation is only available on unix; use --isolation thread")
}

#[cfg(unix)]
async fn serve_child(build: SpecFactory, launch: LaunchConfig, settings: &RunnerSettings) -> anyhow::Result<()> {
    let suite = Suite::new(build(&launch)).with_settings(settings).with_launch(launch);
    let mut link = spectree_common::ProcessLink::stdio();
    let result = spectree_common::isolation::serve_isolated(&suite, &mut link).await?;
    debug!(test = %result.behavior_text, passed = result.passed, "served isolated test");
    Ok(())
}

#[cfg(not(unix))]
async fn serve_child(_build: SpecFactory, _launch: LaunchConfig, _settings: &RunnerSettings) -> anyhow::Result<()> {
    anyhow::bail!("process isolation is only available on unix")
}

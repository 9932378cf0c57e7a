//! Suites: ordered specs run against one reporter

use crate::address::SuiteAddress;
use crate::config::{LaunchConfig, RunnerSettings};
use crate::error::{Error, Result};
use crate::isolation::IsolationHost;
use crate::lifecycle::{self, TestRun};
use crate::model::{Spec, TestRef, DEFAULT_TIMEOUT_MS};
use crate::reporter::{Reporter, ReporterBus, ReporterEvent, TracingReporter};
use crate::result::{TestError, TestResult};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info};

/// Outcome counts of one suite run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn record(&mut self, result: &TestResult) {
        if result.is_skipped() {
            self.skipped += 1;
        } else if result.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// True when nothing failed. Skipped tests do not count as failures.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

pub struct Suite {
    specs: Vec<Spec>,
    reporter: Mutex<ReporterBus>,
    launch: LaunchConfig,
    isolation_host: Option<Arc<dyn IsolationHost>>,
    default_timeout_ms: u64,
}

impl Suite {
    /// A suite over `specs` in run order, reporting through tracing.
    pub fn new(specs: Vec<Spec>) -> Self {
        Self {
            specs,
            reporter: Mutex::new(ReporterBus::new(TracingReporter)),
            launch: LaunchConfig::default(),
            isolation_host: None,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        let disabled = self.reporter.get_mut().disabled;
        let mut bus = ReporterBus::new(reporter);
        bus.disabled = disabled;
        self.reporter = Mutex::new(bus);
        self
    }

    /// Apply launch configuration. Reporting is switched off when the launch
    /// asks for it.
    pub fn with_launch(mut self, launch: LaunchConfig) -> Self {
        if launch.disable_reporting {
            self.reporter.get_mut().disabled = true;
        }
        self.launch = launch;
        self
    }

    pub fn with_isolation_host(mut self, host: Arc<dyn IsolationHost>) -> Self {
        self.isolation_host = Some(host);
        self
    }

    pub fn with_default_timeout(mut self, ms: u64) -> Self {
        self.default_timeout_ms = ms;
        self
    }

    pub fn with_settings(self, settings: &RunnerSettings) -> Self {
        self.with_default_timeout(settings.default_timeout_ms)
    }

    pub fn specs(&self) -> &[Spec] {
        &self.specs
    }

    pub fn launch(&self) -> &LaunchConfig {
        &self.launch
    }

    pub fn isolation_host(&self) -> Option<&Arc<dyn IsolationHost>> {
        self.isolation_host.as_ref()
    }

    pub fn default_timeout_ms(&self) -> u64 {
        self.default_timeout_ms
    }

    pub fn reporting_disabled(&self) -> bool {
        self.reporter.lock().disabled
    }

    /// All tests of all specs, in run order.
    pub fn tests(&self) -> impl Iterator<Item = TestRef<'_>> {
        self.specs.iter().flat_map(Spec::tests)
    }

    pub fn total_test_count(&self) -> usize {
        self.specs.iter().map(Spec::total_test_count).sum()
    }

    pub fn get_test_by_address(&self, address: &SuiteAddress) -> Option<TestRef<'_>> {
        self.specs.get(address.spec_index)?.get_test_by_address(address)
    }

    /// Like [`Suite::get_test_by_address`], but a dangling address is an error.
    pub fn require_test(&self, address: &SuiteAddress) -> Result<TestRef<'_>> {
        self.get_test_by_address(address)
            .ok_or_else(|| Error::UnknownTest(address.clone()))
    }

    pub fn get_address_for_test(&self, test: TestRef<'_>) -> Result<SuiteAddress> {
        let index = self
            .specs
            .iter()
            .position(|spec| std::ptr::eq(spec, test.spec()))
            .ok_or(Error::ForeignTest)?;
        self.specs[index].address_for(test, index)
    }

    /// Dispatch one event to the reporter.
    ///
    /// A panicking reporter is turned into an unexpected-error event; it never
    /// propagates into the run.
    pub fn report(&self, event: ReporterEvent<'_>) -> bool {
        let outcome = {
            let Some(mut bus) = self.reporter.try_lock() else {
                error!(event = event.kind(), "reporter re-entered the suite, dropping event");
                return false;
            };
            panic::catch_unwind(AssertUnwindSafe(|| bus.report(event, self)))
        };

        match outcome {
            Ok(dispatched) => dispatched,
            Err(payload) => {
                let failure = TestError::from_panic(payload);
                if let ReporterEvent::UnexpectedError(..) = event {
                    error!(error = %failure, "reporter failed handling an unexpected error");
                } else {
                    self.report_unexpected(format!("reporter failed handling {}", event.kind()), failure);
                }
                false
            }
        }
    }

    pub fn report_unexpected(&self, message: impl Into<String>, error: TestError) {
        let message = message.into();
        error!(error = %error, "{}", message);
        self.report(ReporterEvent::UnexpectedError(&message, &error));
    }

    /// Run a single test through its lifecycle, without reporting it.
    pub async fn run_test(&self, test: TestRef<'_>) -> TestResult {
        lifecycle::run(TestRun::new(test, self)).await
    }

    /// Run every test in order, or only the addressed one when the launch
    /// configuration carries an address.
    ///
    /// Test failures never make this fail. The only error is an address that
    /// names no test, raised before anything is reported.
    pub async fn run(&self) -> Result<RunSummary> {
        let solo = match &self.launch.suite_address {
            Some(address) => Some(self.require_test(address)?),
            None => None,
        };

        info!(
            specs = self.specs.len(),
            tests = self.total_test_count(),
            solo = solo.is_some(),
            "running suite"
        );

        let mut summary = RunSummary::default();
        self.report(ReporterEvent::SuiteStart);

        for spec in &self.specs {
            self.report(ReporterEvent::SpecStart(spec));

            let in_scope = solo.map_or(true, |test| std::ptr::eq(test.spec(), spec));
            if in_scope {
                for test in spec.tests() {
                    if solo.map_or(false, |solo| solo != test) {
                        continue;
                    }
                    self.report(ReporterEvent::TestStart(test));
                    let result = self.run_test(test).await;
                    summary.record(&result);
                    self.report(ReporterEvent::TestEnd(&result, test));
                }
            }

            self.report(ReporterEvent::SpecEnd(spec));
        }

        self.report(ReporterEvent::SuiteEnd);
        info!(
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "suite finished"
        );
        Ok(summary)
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("specs", &self.specs.len())
            .field("launch", &self.launch)
            .field("isolation_host", &self.isolation_host.is_some())
            .field("default_timeout_ms", &self.default_timeout_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::CollectingReporter;

    struct Exploding;

    impl Reporter for Exploding {
        fn on_test_start(&mut self, _test: TestRef<'_>, _suite: &Suite) {
            panic!("reporter bug");
        }
    }

    fn spec(name: &str, tests: &[&str]) -> Spec {
        let mut spec = Spec::new();
        let tests: Vec<String> = tests.iter().map(|t| t.to_string()).collect();
        spec.describe(name, move |s| {
            for test in tests {
                s.it(test, |_| async { anyhow::Ok(()) });
            }
        });
        spec
    }

    #[tokio::test]
    async fn test_reporter_panic_does_not_abort_run() {
        let suite = Suite::new(vec![spec("a", &["t1", "t2"])]).with_reporter(Exploding);
        let summary = suite.run().await.unwrap();
        assert_eq!(summary.passed, 2);
    }

    #[tokio::test]
    async fn test_unknown_solo_address_is_an_error() {
        let collector = CollectingReporter::new();
        let suite = Suite::new(vec![spec("a", &["t1"])])
            .with_reporter(collector.clone())
            .with_launch(LaunchConfig::solo(SuiteAddress::new(0, vec![], 5)));
        assert!(matches!(suite.run().await, Err(Error::UnknownTest(_))));
        assert!(collector.events().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_reporting_still_runs_tests() {
        let collector = CollectingReporter::new();
        let launch = LaunchConfig {
            disable_reporting: true,
            ..Default::default()
        };
        let suite = Suite::new(vec![spec("a", &["t1"])])
            .with_launch(launch)
            .with_reporter(collector.clone());
        let summary = suite.run().await.unwrap();
        assert_eq!(summary.total(), 1);
        assert!(collector.events().is_empty());
        assert!(suite.reporting_disabled());
    }

    #[test]
    fn test_address_of_test_in_second_spec() {
        let suite = Suite::new(vec![spec("a", &["t1"]), spec("b", &["t2", "t3"])]);
        let last = suite.tests().last().unwrap();
        let address = suite.get_address_for_test(last).unwrap();
        assert_eq!(address, SuiteAddress::new(1, vec![], 1));
        assert_eq!(suite.require_test(&address).unwrap(), last);
        assert_eq!(suite.total_test_count(), 3);
    }
}

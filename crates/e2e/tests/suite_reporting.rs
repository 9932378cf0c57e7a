use spectree_common::{
    CollectingReporter, Implementation, LaunchConfig, Reporter, Spec, Suite, SuiteAddress, TestConfig, TestRef,
    TestResult,
};
use spectree_e2e::specs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn two_specs() -> Vec<Spec> {
    vec![specs::flat("first", &["one"]), specs::flat("second", &["two"])]
}

#[tokio::test]
async fn two_specs_report_each_event_once_in_declaration_order() {
    let collector = CollectingReporter::new();
    let suite = Suite::new(two_specs()).with_reporter(collector.clone());
    let summary = suite.run().await.unwrap();

    assert_eq!(summary.passed, 2);
    assert_eq!(
        collector.events(),
        vec![
            "suiteStart",
            "specStart: first",
            "testStart: first one",
            "testEnd: first one",
            "specEnd: first",
            "specStart: second",
            "testStart: second two",
            "testEnd: second two",
            "specEnd: second",
            "suiteEnd",
        ]
    );
    assert_eq!(collector.spec_results().iter().map(Vec::len).collect::<Vec<_>>(), vec![1, 1]);
}

#[tokio::test]
async fn solo_run_executes_only_the_addressed_test() {
    let collector = CollectingReporter::new();
    let suite = Suite::new(vec![specs::flat("first", &["one", "two"]), specs::flat("second", &["three"])])
        .with_reporter(collector.clone())
        .with_launch(LaunchConfig::solo(SuiteAddress::new(0, vec![], 1)));

    let summary = suite.run().await.unwrap();
    assert_eq!(summary.total(), 1);

    let events = collector.events();
    assert!(events.contains(&"testStart: first two".to_string()));
    assert!(!events.iter().any(|e| e.contains("first one") || e.contains("three")));
    // Every spec is still bracketed by its start and end events.
    assert!(events.contains(&"specStart: second".to_string()));
    assert!(events.contains(&"specEnd: second".to_string()));
}

#[tokio::test]
async fn failures_do_not_stop_the_run() {
    let collector = CollectingReporter::new();
    let mut failing = Spec::new();
    failing.describe("failing", |s| {
        s.it("errors", |_| async { Err::<(), _>(anyhow::anyhow!("expected 2, got 3")) });
        s.test(
            "panics",
            Implementation::from_fn(|_| panic!("index out of bounds")),
            TestConfig::default(),
        );
        s.it("passes", |_| async { anyhow::Ok(()) });
    });

    let summary = Suite::new(vec![failing])
        .with_reporter(collector.clone())
        .run()
        .await
        .unwrap();

    assert_eq!((summary.passed, summary.failed), (1, 2));
    let results = collector.results();
    assert!(results[0].error.as_ref().unwrap().stack.contains("expected 2, got 3"));
    assert!(results[1].error.as_ref().unwrap().stack.contains("index out of bounds"));
    assert!(!summary.is_success());
}

/// Counts passing test ends and ignores every other event.
struct PassCounter(Arc<AtomicUsize>);

impl Reporter for PassCounter {
    fn on_test_end(&mut self, result: &TestResult, _test: TestRef<'_>, _suite: &Suite) {
        if result.passed {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn reporters_may_implement_only_some_callbacks() {
    let passes = Arc::new(AtomicUsize::new(0));
    let suite = Suite::new(two_specs()).with_reporter(PassCounter(passes.clone()));
    suite.run().await.unwrap();
    assert_eq!(passes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn declaration_errors_do_not_prevent_other_tests_from_running() {
    let collector = CollectingReporter::new();
    let mut spec = Spec::new();
    spec.describe("partly broken", |s| {
        s.describe("factory fails", |s| -> anyhow::Result<()> {
            s.it("declared before failure", |_| async { anyhow::Ok(()) });
            anyhow::bail!("bad table")
        });
        s.it("sibling", |_| async { anyhow::Ok(()) });
    });

    let summary = Suite::new(vec![spec])
        .with_reporter(collector.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.passed, 2);
}

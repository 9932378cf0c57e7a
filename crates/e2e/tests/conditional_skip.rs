use spectree_common::{standard, CollectingReporter, Spec, Suite, TestConfig};
use spectree_e2e::CallLog;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn conditional_spec(log: &CallLog, config: TestConfig) -> Spec {
    let mut spec = standard().spec();
    spec.describe("conditional", |s| {
        s.test("body", log.test("invoked"), config);
    });
    spec
}

async fn run_one(spec: Spec) -> (CollectingReporter, spectree_common::TestResult) {
    let collector = CollectingReporter::new();
    Suite::new(vec![spec]).with_reporter(collector.clone()).run().await.unwrap();
    let result = collector.results().pop().expect("one result");
    (collector, result)
}

#[tokio::test]
async fn false_condition_skips_without_invoking() {
    let log = CallLog::new();
    let (_, result) = run_one(conditional_spec(&log, TestConfig::default().with_condition(|| false))).await;

    assert!(!result.passed);
    assert_eq!(result.skipped, Some(true));
    assert!(result.error.is_none());
    assert_eq!(log.count("invoked"), 0);
}

#[tokio::test]
async fn true_condition_behaves_like_no_condition() {
    let log = CallLog::new();
    let (_, conditioned) = run_one(conditional_spec(&log, TestConfig::default().with_condition(|| true))).await;
    let (_, plain) = run_one(conditional_spec(&log, TestConfig::default())).await;

    assert_eq!(log.count("invoked"), 2);
    assert_eq!(conditioned.passed, plain.passed);
    assert_eq!(conditioned.skipped, plain.skipped);
    assert_eq!(conditioned.skipped, None);
}

#[tokio::test]
async fn condition_is_evaluated_once_per_run() {
    let log = CallLog::new();
    let evaluations = Arc::new(AtomicUsize::new(0));
    let counter = evaluations.clone();
    let config = TestConfig::default().with_condition(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        true
    });
    run_one(conditional_spec(&log, config)).await;
    assert_eq!(evaluations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_condition_is_reported_and_the_test_still_runs() {
    let log = CallLog::new();
    let config = TestConfig::default().with_fallible_condition(|| anyhow::bail!("feature probe crashed"));
    let (collector, result) = run_one(conditional_spec(&log, config)).await;

    assert!(result.passed);
    assert_eq!(result.skipped, None);
    assert_eq!(log.count("invoked"), 1);

    let unexpected = collector.unexpected_errors();
    assert_eq!(unexpected.len(), 1);
    assert!(unexpected[0].0.contains("conditional body"));
    assert!(unexpected[0].1.stack.contains("feature probe crashed"));
}

#[tokio::test]
async fn skipped_tests_do_not_fail_the_summary() {
    let log = CallLog::new();
    let spec = conditional_spec(&log, TestConfig::default().with_condition(|| false));
    let summary = Suite::new(vec![spec]).run().await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.failed, 0);
    assert!(summary.is_success());
}

#[tokio::test]
async fn condition_is_ignored_without_the_conditional_capability() {
    let log = CallLog::new();
    let mut spec = Spec::new();
    spec.describe("plain", |s| {
        s.test("body", log.test("invoked"), TestConfig::default().with_condition(|| false));
    });
    let (_, result) = run_one(spec).await;

    assert!(result.passed);
    assert_eq!(log.count("invoked"), 1);
}

//! Spec trees shared by the integration tests

use crate::recorder::CallLog;
use spectree_common::{standard, FixtureBuilderExt, Spec, TestConfig};

/// Failure message of [`isolated_specs`]' failing test.
pub const ISOLATED_FAILURE: &str = "isolated body failed on purpose";

/// `a { t1, b { t2 }, t3 }` with passing bodies.
pub fn nested_abc() -> Spec {
    let mut spec = Spec::new();
    spec.describe("a", |s| {
        s.it("t1", |_| async { anyhow::Ok(()) });
        s.describe("b", |s| {
            s.it("t2", |_| async { anyhow::Ok(()) });
        });
        s.it("t3", |_| async { anyhow::Ok(()) });
    });
    spec
}

/// A spec with one topic holding one passing test per name.
pub fn flat(topic: &str, tests: &[&str]) -> Spec {
    let tests: Vec<String> = tests.iter().map(|t| t.to_string()).collect();
    let mut spec = standard().spec();
    spec.describe(topic, move |s| {
        for test in tests {
            s.it(test, |_| async { anyhow::Ok(()) });
        }
    });
    spec
}

/// Two tests over interleaved fixture declarations. Steps declared after a
/// nested topic still belong to the outer topic.
pub fn invocation_order(log: &CallLog) -> Spec {
    let mut spec = standard().spec();
    spec.describe("fixturable spec", |s| {
        s.before(log.fixture("before1"));
        s.after(log.cleanup("after1"));
        s.setup(log.fixture("before2"));
        s.teardown(log.cleanup("after2"));

        s.test("has a test", log.test("test1"), TestConfig::default());

        s.describe("nested topic", |s| {
            s.after(log.cleanup("after4"));
            s.test("has a nested test", log.test("test2"), TestConfig::default());
            s.before(log.fixture("before4"));
        });

        s.before(log.fixture("before3"));
        s.after(log.cleanup("after3"));
    });
    spec
}

/// Fixtures f1, f2 and cleanups c1, c2 on `A`; fixture f3 and cleanup c3 on
/// its child `B`, which holds the single test.
pub fn nested_fixtures(log: &CallLog) -> Spec {
    let mut spec = standard().spec();
    spec.describe("A", |s| {
        s.fixture(log.fixture("f1"));
        s.fixture(log.fixture("f2"));
        s.cleanup(log.cleanup("c1"));
        s.cleanup(log.cleanup("c2"));
        s.describe("B", |s| {
            s.fixture(log.fixture("f3"));
            s.cleanup(log.cleanup("c3"));
            s.test("runs in B", log.test("test"), TestConfig::default());
        });
    });
    spec
}

/// Specs run inside isolated contexts.
///
/// Each test body records the name of the thread it ran on, so a caller
/// sharing `log` with a thread host can tell where a test executed.
pub fn isolated_specs(log: &CallLog) -> Vec<Spec> {
    let mut spec = standard().spec();
    spec.describe("isolation", |s| {
        let recorder = log.clone();
        s.it_with("runs isolated", TestConfig::default().with_isolation(), move |_| {
            recorder.push(format!("ran on {}", current_thread_name()));
            async { anyhow::Ok(()) }
        });

        let recorder = log.clone();
        s.it_with("fails isolated", TestConfig::default().with_isolation(), move |_| {
            recorder.push(format!("failed on {}", current_thread_name()));
            async { Err::<(), _>(anyhow::anyhow!(ISOLATED_FAILURE)) }
        });

        let recorder = log.clone();
        s.it("runs inline", move |_| {
            recorder.push(format!("inline on {}", current_thread_name()));
            async { anyhow::Ok(()) }
        });
    });
    vec![spec]
}

fn current_thread_name() -> String {
    std::thread::current().name().unwrap_or("unnamed").to_string()
}

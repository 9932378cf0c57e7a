//! Built-in suite exercising every capability
//!
//! `spectree-selftest` runs it through the harness, so the binary doubles as
//! a smoke test for a fresh checkout and for the process isolation path.

use spectree_common::{standard, time_passes, FixtureBuilderExt, FixtureContext, LaunchConfig, Spec, TestConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counter shared through the fixture context.
#[derive(Debug, Default)]
pub struct Visits(AtomicUsize);

impl Visits {
    fn record(ctx: &FixtureContext) {
        if let Some(visits) = ctx.get_shared::<Visits>("visits") {
            visits.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn specs(_launch: &LaunchConfig) -> Vec<Spec> {
    vec![lifecycle_spec(), conditions_spec()]
}

fn lifecycle_spec() -> Spec {
    let mut spec = standard().spec();
    spec.describe("lifecycle", |s| {
        s.fixture(|ctx: &mut FixtureContext| ctx.insert("greeting", "hello".to_string()));
        s.fixture(|ctx: &mut FixtureContext| ctx.insert_shared("visits", Arc::new(Visits::default())));
        s.cleanup(|ctx: &FixtureContext| -> anyhow::Result<()> {
            let visits = ctx
                .get_shared::<Visits>("visits")
                .ok_or_else(|| anyhow::anyhow!("visits missing at cleanup"))?;
            anyhow::ensure!(visits.count() == 1, "test body ran {} times", visits.count());
            Ok(())
        });

        s.it("reads fixture values", |ctx| async move {
            let greeting = ctx.get::<String>("greeting").cloned();
            anyhow::ensure!(greeting.as_deref() == Some("hello"), "unexpected greeting {:?}", greeting);
            Visits::record(&ctx);
            Ok(())
        });

        s.describe("nested", |s| {
            s.fixture(|ctx: &mut FixtureContext| {
                let outer = ctx.get::<String>("greeting").cloned().unwrap_or_default();
                ctx.insert("greeting", format!("{} again", outer));
            });

            s.it("sees outer fixtures first", |ctx| async move {
                let greeting = ctx.get::<String>("greeting").cloned();
                anyhow::ensure!(greeting.as_deref() == Some("hello again"), "unexpected greeting {:?}", greeting);
                Visits::record(&ctx);
                Ok(())
            });
        });

        s.it_with(
            "finishes within its timeout",
            TestConfig::default().with_timeout(1_000),
            |ctx| async move {
                time_passes(5).await;
                Visits::record(&ctx);
                Ok(())
            },
        );
    });
    spec
}

fn conditions_spec() -> Spec {
    let mut spec = standard().spec();
    spec.describe("conditions and isolation", |s| {
        s.it_with(
            "runs in a separate context",
            TestConfig::default().with_isolation(),
            |_| async { anyhow::Ok(()) },
        );
        s.it("runs in place", |_| async { anyhow::Ok(()) });
        s.it_with(
            "is skipped when its condition is false",
            TestConfig::default().with_condition(|| false),
            |_| async { Err::<(), _>(anyhow::anyhow!("skipped tests never run")) },
        );
    });
    spec
}

//! Output formatting for the harness

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde_json::json;
use spectree_common::{Reporter, RunSummary, Spec, Suite, TestError, TestRef, TestResult};
use std::io::{self, Write};

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable console output
    #[default]
    Console,
    /// One JSON object per line
    Json,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

/// One line of `--list` output.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestListing {
    pub address: String,
    pub behavior_text: String,
    pub timeout: Option<u64>,
    pub isolated: bool,
    pub conditional: bool,
}

impl TestListing {
    pub fn collect(suite: &Suite) -> Vec<Self> {
        suite
            .tests()
            .map(|test| {
                let config = test.config();
                Self {
                    address: suite
                        .get_address_for_test(test)
                        .map(|address| address.to_string())
                        .unwrap_or_default(),
                    behavior_text: test.behavior_text(),
                    timeout: config.timeout,
                    isolated: config.isolated,
                    conditional: config.condition.is_some(),
                }
            })
            .collect()
    }
}

impl TableDisplay for TestListing {
    fn headers() -> Vec<&'static str> {
        vec!["Address", "Test", "Timeout", "Flags"]
    }

    fn row(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.isolated {
            flags.push("isolated");
        }
        if self.conditional {
            flags.push("conditional");
        }
        vec![
            self.address.clone(),
            self.behavior_text.clone(),
            self.timeout.map(|ms| format!("{}ms", ms)).unwrap_or_else(|| "default".to_string()),
            flags.join(", "),
        ]
    }
}

/// Print a list of items
pub fn print_list<T: serde::Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Console => {
            if items.is_empty() {
                println!("No tests found.");
                return;
            }
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic);

            table.set_header(T::headers());
            for item in items {
                table.add_row(item.row());
            }

            println!("{table}");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
        }
    }
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

/// Build the reporter for `format`, writing to stdout.
pub fn reporter(format: OutputFormat) -> Box<dyn Reporter> {
    match format {
        OutputFormat::Console => Box::new(ConsoleReporter::new(io::stdout())),
        OutputFormat::Json => Box::new(JsonReporter::new(io::stdout())),
    }
}

fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Passed", "Failed", "Skipped", "Total"]);
    table.add_row(vec![
        summary.passed.to_string(),
        summary.failed.to_string(),
        summary.skipped.to_string(),
        summary.total().to_string(),
    ]);
    table
}

/// Colored, human-readable progress and a closing summary table.
pub struct ConsoleReporter {
    out: Box<dyn Write + Send>,
    summary: RunSummary,
}

impl ConsoleReporter {
    pub fn new<W: Write + Send + 'static>(out: W) -> Self {
        Self {
            out: Box::new(out),
            summary: RunSummary::default(),
        }
    }

    // Reporters cannot fail the run, so write errors are dropped here.
    fn line(&mut self, text: impl std::fmt::Display) {
        let _ = writeln!(self.out, "{}", text);
    }
}

impl Reporter for ConsoleReporter {
    fn on_spec_start(&mut self, spec: &Spec, _suite: &Suite) {
        let title = spec.description().unwrap_or("(empty spec)");
        self.line(format!("\n{}", title.bold()));
    }

    fn on_test_end(&mut self, result: &TestResult, _test: TestRef<'_>, _suite: &Suite) {
        self.summary.record(result);

        let status = if result.is_skipped() {
            "SKIPPED".yellow()
        } else if result.passed {
            "PASSED".green()
        } else {
            "FAILED".red()
        };
        let isolated = if result.is_isolated() {
            format!("{} ", "ISOLATED".cyan())
        } else {
            String::new()
        };
        self.line(format!("  {} {}{}", status, isolated, result.behavior_text));

        if let Some(error) = &result.error {
            for line in error.stack.lines() {
                self.line(format!("      {}", line.dimmed()));
            }
        }
    }

    fn on_unexpected_error(&mut self, message: &str, error: &TestError, _suite: &Suite) {
        self.line(format!("{} {}: {}", "UNEXPECTED".red().bold(), message, error.message()));
    }

    fn on_suite_end(&mut self, _suite: &Suite) {
        let table = summary_table(&self.summary);
        self.line(format!("\n{table}"));
        let verdict = if self.summary.is_success() {
            "All tests passed".green().bold()
        } else {
            "Some tests failed".red().bold()
        };
        self.line(verdict);
        let _ = self.out.flush();
    }
}

/// Machine-readable event stream, one JSON object per line.
pub struct JsonReporter {
    out: Box<dyn Write + Send>,
}

impl JsonReporter {
    pub fn new<W: Write + Send + 'static>(out: W) -> Self {
        Self { out: Box::new(out) }
    }

    fn emit(&mut self, value: serde_json::Value) {
        let _ = writeln!(self.out, "{}", value);
    }
}

impl Reporter for JsonReporter {
    fn on_suite_start(&mut self, suite: &Suite) {
        self.emit(json!({ "event": "suiteStart", "tests": suite.total_test_count() }));
    }

    fn on_suite_end(&mut self, _suite: &Suite) {
        self.emit(json!({ "event": "suiteEnd" }));
        let _ = self.out.flush();
    }

    fn on_spec_start(&mut self, spec: &Spec, _suite: &Suite) {
        self.emit(json!({ "event": "specStart", "spec": spec.description() }));
    }

    fn on_spec_end(&mut self, spec: &Spec, _suite: &Suite) {
        self.emit(json!({ "event": "specEnd", "spec": spec.description() }));
    }

    fn on_test_start(&mut self, test: TestRef<'_>, suite: &Suite) {
        let address = suite.get_address_for_test(test).ok().map(|a| a.to_string());
        self.emit(json!({ "event": "testStart", "test": test.behavior_text(), "address": address }));
    }

    fn on_test_end(&mut self, result: &TestResult, _test: TestRef<'_>, _suite: &Suite) {
        self.emit(json!({ "event": "testEnd", "result": result }));
    }

    fn on_unexpected_error(&mut self, message: &str, error: &TestError, _suite: &Suite) {
        self.emit(json!({ "event": "unexpectedError", "message": message, "error": error }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use spectree_common::{standard, TestConfig};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Buffer {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn sample_suite() -> Suite {
        let mut spec = standard().spec();
        spec.describe("sample", |s| {
            s.it("passes", |_| async { anyhow::Ok(()) });
            s.it("fails", |_| async { Err::<(), _>(anyhow::anyhow!("boom")) });
            s.it_with("skips", TestConfig::default().with_condition(|| false), |_| async {
                anyhow::Ok(())
            });
        });
        Suite::new(vec![spec])
    }

    #[tokio::test]
    async fn test_console_reporter_marks_each_outcome() {
        let buffer = Buffer::default();
        let suite = sample_suite().with_reporter(ConsoleReporter::new(buffer.clone()));
        suite.run().await.unwrap();

        let text = buffer.text();
        assert!(text.contains("sample"));
        assert!(text.contains("PASSED"));
        assert!(text.contains("FAILED"));
        assert!(text.contains("SKIPPED"));
        assert!(text.contains("boom"));
        assert!(text.contains("Some tests failed"));
    }

    #[tokio::test]
    async fn test_json_reporter_emits_one_object_per_line() {
        let buffer = Buffer::default();
        let suite = sample_suite().with_reporter(JsonReporter::new(buffer.clone()));
        suite.run().await.unwrap();

        let events: Vec<serde_json::Value> = buffer
            .text()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let kinds: Vec<&str> = events.iter().map(|e| e["event"].as_str().unwrap()).collect();
        assert_eq!(kinds.first(), Some(&"suiteStart"));
        assert_eq!(kinds.last(), Some(&"suiteEnd"));
        assert_eq!(kinds.iter().filter(|k| **k == "testEnd").count(), 3);

        let failed = events
            .iter()
            .find(|e| e["event"] == "testEnd" && e["result"]["passed"] == false && e["result"]["skipped"].is_null())
            .unwrap();
        assert!(failed["result"]["error"]["stack"].as_str().unwrap().contains("boom"));
    }

    #[test]
    fn test_listing_rows() {
        let listings = TestListing::collect(&sample_suite());
        assert_eq!(listings.len(), 3);
        assert_eq!(listings[0].row(), vec!["0#0", "sample passes", "default", ""]);
        assert_eq!(listings[2].row()[3], "conditional");
    }
}

//! Result aggregation and console reporting
//!
//! The reporter is the run's only accumulator: every assertion outcome flows
//! through it, it prints the per-assertion progress lines operators read, and
//! at the end it yields the summary the exit status is derived from. There is
//! no global counter anywhere; the summary is an owned value threaded
//! through the run.

use crate::check::AssertionResult;
use http::Method;

/// Aggregated verdict for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Assertions that held
    pub passed: usize,
    /// Assertions that did not
    pub failed: usize,
    /// Whether an infrastructure failure cut the run short
    pub fatal: bool,
}

impl RunSummary {
    /// Process exit status: zero only if every assertion across the entire
    /// run passed and no fatal condition occurred.
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 && !self.fatal { 0 } else { 1 }
    }

    /// Whether the run passed outright.
    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

/// Prints per-request and per-assertion progress and accumulates the verdict.
#[derive(Debug, Default)]
pub struct Reporter {
    summary: RunSummary,
}

impl Reporter {
    /// Creates an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Announces a request about to be issued.
    pub fn request(&self, method: &Method, host: &str, path: &str) {
        println!("\n  → Testing: {method} {host}{path}");
    }

    /// Records one assertion outcome and prints its line.
    pub fn record(&mut self, result: &AssertionResult) {
        if result.passed {
            self.summary.passed += 1;
            println!("    ✓ {}", result.detail);
        } else {
            self.summary.failed += 1;
            println!("    ✗ {}", result.detail);
        }
    }

    /// Records a batch of results in order.
    pub fn record_all(&mut self, results: &[AssertionResult]) {
        for result in results {
            self.record(result);
        }
    }

    /// Marks the run as cut short by infrastructure, not by an assertion.
    pub fn mark_fatal(&mut self) {
        self.summary.fatal = true;
    }

    /// Running totals so far.
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Prints the final summary block and returns the verdict.
    pub fn finish(self) -> RunSummary {
        println!("\n{}", "=".repeat(60));
        println!("Total assertions passed: {}", self.summary.passed);
        if self.summary.failed > 0 {
            println!("Assertions failed: {}", self.summary.failed);
        }
        println!(
            "Result: {}",
            if self.summary.is_success() { "PASS" } else { "FAIL" }
        );
        println!("{}", "=".repeat(60));
        self.summary
    }
}

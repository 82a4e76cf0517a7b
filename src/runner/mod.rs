//! Suite orchestration
//!
//! Ties the pieces together in the order the run demands: the readiness
//! probe gates everything, the loader produces the model, the driver walks
//! it sequentially, the assertion engine judges each captured outcome, and
//! the reporter accumulates the verdict.

use crate::driver::{DriverConfig, RequestDriver, plan};
use crate::probe::{ProbeConfig, ReadinessProbe};
use crate::report::{Reporter, RunSummary};
use crate::spec::{self, TestSpecification};
use crate::{HarnessError, Result, check};
use std::path::Path;
use tokio::time::sleep;
use tracing::{debug, error};

/// Configuration for a whole suite run.
#[derive(Debug, Clone, Default)]
pub struct SuiteConfig {
    /// Readiness probing of the target
    pub probe: ProbeConfig,
    /// Request driving against the target
    pub driver: DriverConfig,
}

/// Runs a whole suite: probe, load, drive, evaluate, report.
pub struct SuiteRunner {
    config: SuiteConfig,
}

impl SuiteRunner {
    /// Creates a runner with the given configuration.
    pub fn new(config: SuiteConfig) -> Self {
        Self { config }
    }

    /// Runs the specification document at `spec_path` against the target.
    ///
    /// The readiness probe gates the run: a target that never comes up
    /// aborts before the document is even opened, with no per-assertion
    /// output. Assertion failures never abort; connectivity failures always
    /// do.
    pub async fn run(&self, spec_path: impl AsRef<Path>) -> Result<RunSummary> {
        let probe = ReadinessProbe::new(self.config.probe.clone());
        if !probe.wait_for_ready().await {
            return Err(HarnessError::ReadinessTimeout {
                target: self.config.probe.target.to_string(),
                waited: self.config.probe.max_wait,
            });
        }
        let specification = spec::load(spec_path)?;
        self.drive(&specification).await
    }

    /// Drives an already-loaded specification, assuming the target is up.
    pub async fn drive(&self, specification: &TestSpecification) -> Result<RunSummary> {
        let driver = RequestDriver::new(self.config.driver.clone());
        let mut reporter = Reporter::new();

        debug!(
            requests = specification.request_count(),
            "Starting suite run"
        );

        for planned in plan(specification) {
            // Declared courtesy delay, a throttle for rate-limited targets.
            if !planned.case.sleep.is_zero() {
                sleep(planned.case.sleep).await;
            }

            reporter.request(&planned.case.method, planned.host, planned.path);
            let outcome = match driver.execute(&planned).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    // Dead target: no partial credit for the cases that never
                    // ran, surface the infrastructure failure as-is.
                    error!(error = %err, "Aborting run, target unreachable");
                    return Err(err);
                }
            };
            let results = check::evaluate(planned.case, &outcome);
            reporter.record_all(&results);
        }

        Ok(reporter.finish())
    }
}

use crate::driver::wire::WireError;
use crate::spec::SpecificationError;
use http::Method;
use std::time::Duration;
use thiserror::Error;

/// Error types for the httptests library
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Test specification could not be loaded or resolved
    #[error("specification error: {0}")]
    Specification(#[from] SpecificationError),

    /// Target never accepted a connection within the readiness window
    #[error("target {target} not ready after {waited:?}")]
    ReadinessTimeout {
        /// Address that was probed
        target: String,
        /// How long the probe waited before giving up
        waited: Duration,
    },

    /// A request could not be completed once the run was underway
    ///
    /// Distinct from an assertion failure: the target under test is
    /// unreachable, which is an infrastructure failure rather than a
    /// behavioral mismatch. The whole run aborts.
    #[error("connectivity error for {method} {host}{path}: {source}")]
    Connectivity {
        /// Method of the request that failed
        method: Method,
        /// Host header the request carried
        host: String,
        /// Path the request targeted
        path: String,
        /// Wire-level cause
        source: WireError,
    },

    /// I/O errors (bind, connect, read, write)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors
    #[error("timeout: {0}")]
    Timeout(String),

    /// HTTP framing or parsing errors on the wire
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for the httptests library
pub type Result<T> = std::result::Result<T, HarnessError>;

pub mod check;
pub mod compose;
pub mod driver;
pub mod patch;
pub mod probe;
pub mod report;
pub mod runner;
pub mod spec;
pub mod upstream;

// Re-export main types for convenience
pub use check::{AssertionResult, CheckCategory, evaluate};
pub use driver::{DriverConfig, PlannedRequest, RequestDriver, RequestOutcome, plan};
pub use probe::{ProbeConfig, ReadinessProbe};
pub use report::{Reporter, RunSummary};
pub use runner::{SuiteConfig, SuiteRunner};
pub use spec::{EndpointCase, HeaderExpectation, HostCases, RequestBody, TestSpecification};
pub use upstream::{UpstreamConfig, UpstreamServer};

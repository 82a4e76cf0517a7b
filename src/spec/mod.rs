//! Test specification model and loader
//!
//! This module owns the declarative description of a suite: which hosts and
//! endpoints to exercise, what to send, and which header transformations the
//! proxy under test must perform. Documents are resolved completely at load
//! time (defaults applied, sentinels expanded, names validated), so the rest
//! of the harness only ever sees typed, fully-specified cases.

pub mod loader;
pub mod model;

pub use loader::{SpecificationError, load, parse};
pub use model::{
    EndpointCase, HeaderExpectation, HostCases, RequestBody, TestSpecification,
    merge_request_headers,
};

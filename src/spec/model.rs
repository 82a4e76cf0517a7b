use http::{HeaderName, Method, StatusCode, header};
use std::time::Duration;

/// A declared expectation about a single header.
///
/// The document's 1- and 2-element tuple forms and the reserved `$deleted`
/// value are resolved into these variants once, by the loader; evaluation
/// never re-interprets in-band markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderExpectation {
    /// The header must be present, with any value.
    Present(HeaderName),
    /// The header must be present with exactly this value (byte-for-byte).
    Equals(HeaderName, String),
    /// The header must be absent.
    Absent(HeaderName),
}

impl HeaderExpectation {
    /// The header name this expectation is about.
    pub fn name(&self) -> &HeaderName {
        match self {
            Self::Present(name) | Self::Equals(name, _) | Self::Absent(name) => name,
        }
    }
}

/// How the body for a case's requests is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// No body.
    None,
    /// A literal payload taken verbatim from the document.
    Literal(Vec<u8>),
    /// This many random bytes, drawn fresh for every path.
    Generated(usize),
}

/// One declared test unit: a request pattern and its expectations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCase {
    /// Request method (document default: GET)
    pub method: Method,
    /// Paths to exercise, each one independently, in declared order
    pub paths: Vec<String>,
    /// Delay applied before each of this case's requests
    pub sleep: Duration,
    /// Request body
    pub body: RequestBody,
    /// Expected response status (document default: 200)
    pub expected_status: StatusCode,
    /// Expectations against the proxy's response headers
    pub expected_response_headers: Vec<HeaderExpectation>,
    /// Expectations against the headers the upstream reports having received.
    /// Collection headers are already expanded into this list by the loader.
    pub expected_upstream_headers: Vec<HeaderExpectation>,
    /// Extra request headers, merged over the default `Host` header
    pub additional_headers: Vec<(HeaderName, String)>,
}

/// All cases declared under one host name, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCases {
    /// Value for the requests' `Host` header
    pub host: String,
    /// Cases to run against this host
    pub cases: Vec<EndpointCase>,
}

/// A fully-resolved test specification, owned read-only for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSpecification {
    /// Hosts in document order
    pub hosts: Vec<HostCases>,
}

impl TestSpecification {
    /// Total number of requests a run of this specification will issue.
    pub fn request_count(&self) -> usize {
        self.hosts
            .iter()
            .flat_map(|host| &host.cases)
            .map(|case| case.paths.len())
            .sum()
    }
}

/// Builds the outgoing header set for one request.
///
/// The merge is ordered with explicit precedence: a `Host` header for the
/// owning host name comes first, then each additional header in document
/// order. A later entry whose name collides with an earlier one overwrites
/// its value in place, so an explicit `Host` in the additional headers wins
/// over the default.
pub fn merge_request_headers(
    host: &str,
    additional: &[(HeaderName, String)],
) -> Vec<(HeaderName, String)> {
    let mut merged: Vec<(HeaderName, String)> = vec![(header::HOST, host.to_string())];
    for (name, value) in additional {
        match merged.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = value.clone(),
            None => merged.push((name.clone(), value.clone())),
        }
    }
    merged
}

//! Request driving
//!
//! Walks a resolved specification strictly in declared order (hosts, then
//! cases, then paths) and issues one real request per planned triple through
//! the proxy under test. Requests are issued sequentially, never in
//! parallel: the target may be rate-limited, and declaration order is what
//! operators correlate progress output against.

pub mod config;
pub mod wire;

pub use config::DriverConfig;
pub use wire::{WireClient, WireConfig, WireError};

use crate::spec::{EndpointCase, RequestBody, TestSpecification, merge_request_headers};
use crate::{HarnessError, Result};
use http::{HeaderMap, HeaderName, Method, StatusCode};
use rand::RngCore;
use tracing::debug;

/// One (host, case, path) triple scheduled for execution.
#[derive(Debug, Clone, Copy)]
pub struct PlannedRequest<'a> {
    /// Owning host name; becomes the default `Host` header
    pub host: &'a str,
    /// The case this request belongs to
    pub case: &'a EndpointCase,
    /// Path to request, appended to the driver's base address
    pub path: &'a str,
}

/// Yields every (host, case, path) triple strictly in specification order.
///
/// The iterator is lazy and restartable: planning allocates nothing and a
/// second call walks the same sequence again.
pub fn plan(spec: &TestSpecification) -> impl Iterator<Item = PlannedRequest<'_>> {
    spec.hosts.iter().flat_map(|host| {
        host.cases.iter().flat_map(move |case| {
            case.paths.iter().map(move |path| PlannedRequest {
                host: &host.host,
                case,
                path,
            })
        })
    })
}

/// Everything observed for one issued request.
#[derive(Debug)]
pub struct RequestOutcome {
    /// Method that was sent
    pub method: Method,
    /// Host the request was addressed to
    pub host: String,
    /// Path that was requested
    pub path: String,
    /// Header set as it went on the wire, in order
    pub sent_headers: Vec<(HeaderName, String)>,
    /// Received status code
    pub status: StatusCode,
    /// Received response headers
    pub headers: HeaderMap,
    /// Raw response body
    pub body: Vec<u8>,
}

/// Issues the planned requests of a suite, one connection per request.
pub struct RequestDriver {
    config: DriverConfig,
    client: WireClient,
}

impl RequestDriver {
    /// Creates a driver for the configured target.
    pub fn new(config: DriverConfig) -> Self {
        let client = WireClient::new(WireConfig {
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
            buffer_size: config.buffer_size,
            max_response_size: config.max_response_size,
        });
        Self { config, client }
    }

    /// Issues one planned request and captures the full response.
    ///
    /// Any connect failure or timeout here is fatal for the run: it means
    /// the target under test is unreachable, which is infrastructure
    /// failure, not an assertion mismatch.
    pub async fn execute(&self, planned: &PlannedRequest<'_>) -> Result<RequestOutcome> {
        let headers = merge_request_headers(planned.host, &planned.case.additional_headers);
        let body = materialize_body(&planned.case.body);

        debug!(
            method = %planned.case.method,
            host = planned.host,
            path = planned.path,
            body_len = body.len(),
            "Issuing request"
        );

        let request = wire::WireRequest {
            method: &planned.case.method,
            path: planned.path,
            headers: &headers,
            body: &body,
        };
        let response = self
            .client
            .exchange(self.config.base_addr, &request)
            .await
            .map_err(|source| HarnessError::Connectivity {
                method: planned.case.method.clone(),
                host: planned.host.to_string(),
                path: planned.path.to_string(),
                source,
            })?;

        Ok(RequestOutcome {
            method: planned.case.method.clone(),
            host: planned.host.to_string(),
            path: planned.path.to_string(),
            sent_headers: headers,
            status: response.status,
            headers: response.headers,
            body: response.body,
        })
    }
}

/// Produces the on-wire body for one request. Generated payloads are drawn
/// fresh on every call, so two paths of the same case never share bytes.
fn materialize_body(body: &RequestBody) -> Vec<u8> {
    match body {
        RequestBody::None => Vec::new(),
        RequestBody::Literal(data) => data.clone(),
        RequestBody::Generated(size) => {
            let mut payload = vec![0u8; *size];
            rand::thread_rng().fill_bytes(&mut payload);
            payload
        }
    }
}

use super::model::{
    EndpointCase, HeaderExpectation, HostCases, RequestBody, TestSpecification,
};
use http::{HeaderName, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Reserved value asserting a header's absence.
const DELETED_SENTINEL: &str = "$deleted";
/// Reserved entry splicing the document's shared collection headers into an
/// endpoint's upstream expectations.
const COLLECTION_SENTINEL: &str = "$collectionheaders";

#[derive(Error, Debug)]
pub enum SpecificationError {
    #[error("failed to read specification {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed specification document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("specification has no \"hosts\" key")]
    MissingHosts,
    #[error("host {0:?} declares no endpoint cases")]
    EmptyHost(String),
    #[error("an endpoint under host {0:?} declares no paths")]
    EmptyPaths(String),
    #[error("header assertion must have 1 or 2 elements, got {0}")]
    BadAssertionArity(usize),
    #[error("unexpected bare string {0:?} in header assertion list")]
    UnexpectedString(String),
    #[error("\"$collectionHeaders\" is only valid in upstream request header expectations")]
    MisplacedCollectionSentinel,
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),
    #[error("additional request header {0:?} must have a string value")]
    InvalidHeaderValue(String),
    #[error("invalid method {0:?}")]
    InvalidMethod(String),
    #[error("invalid expected status {0}")]
    InvalidStatus(u16),
    #[error("sleep must be a non-negative number of seconds, got {0}")]
    InvalidSleep(f64),
}

/// Raw mirror of the on-disk document, before resolution.
#[derive(Debug, Deserialize)]
struct RawSpecification {
    #[serde(default)]
    hosts: Option<Map<String, Value>>,
    #[serde(default, rename = "collectionHeaders")]
    collection_headers: Vec<RawAssertion>,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    paths: Option<Vec<String>>,
    #[serde(default)]
    sleep: Option<f64>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default, rename = "generatePayloadSize")]
    generate_payload_size: Option<usize>,
    #[serde(default, rename = "expectedStatus")]
    expected_status: Option<u16>,
    #[serde(default, rename = "expectedResponseHeaders")]
    expected_response_headers: Vec<RawAssertion>,
    #[serde(default, rename = "expectedRequestHeadersToUpstream")]
    expected_request_headers_to_upstream: Vec<RawAssertion>,
    #[serde(default, rename = "additionalRequestHeaders")]
    additional_request_headers: Map<String, Value>,
}

/// One entry of an assertion list: either a 1- or 2-element tuple, or the
/// bare collection sentinel string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAssertion {
    Marker(String),
    Tuple(Vec<String>),
}

impl RawAssertion {
    fn is_collection_sentinel(&self) -> bool {
        let text = match self {
            Self::Marker(text) => text,
            Self::Tuple(tuple) if tuple.len() == 1 => &tuple[0],
            Self::Tuple(_) => return false,
        };
        text.eq_ignore_ascii_case(COLLECTION_SENTINEL)
    }
}

/// Loads and fully resolves the specification document at `path`.
///
/// Performs no network access and reads exactly this one file. All defaults
/// are applied here, never at request time.
pub fn load(path: impl AsRef<Path>) -> Result<TestSpecification, SpecificationError> {
    let path = path.as_ref();
    let document = std::fs::read_to_string(path).map_err(|source| SpecificationError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let specification = parse(&document)?;
    debug!(
        path = %path.display(),
        hosts = specification.hosts.len(),
        requests = specification.request_count(),
        "Loaded test specification"
    );
    Ok(specification)
}

/// Parses and resolves a specification document held in memory.
pub fn parse(document: &str) -> Result<TestSpecification, SpecificationError> {
    let raw: RawSpecification = serde_json::from_str(document)?;
    resolve(raw)
}

fn resolve(raw: RawSpecification) -> Result<TestSpecification, SpecificationError> {
    let raw_hosts = raw.hosts.ok_or(SpecificationError::MissingHosts)?;
    let collection = resolve_assertions(&raw.collection_headers)?;

    let mut hosts = Vec::with_capacity(raw_hosts.len());
    for (host, value) in raw_hosts {
        let raw_cases: Vec<RawEndpoint> = serde_json::from_value(value)?;
        if raw_cases.is_empty() {
            return Err(SpecificationError::EmptyHost(host));
        }
        let mut cases = Vec::with_capacity(raw_cases.len());
        for raw_case in raw_cases {
            cases.push(resolve_endpoint(&host, raw_case, &collection)?);
        }
        hosts.push(HostCases { host, cases });
    }

    Ok(TestSpecification { hosts })
}

fn resolve_endpoint(
    host: &str,
    raw: RawEndpoint,
    collection: &[HeaderExpectation],
) -> Result<EndpointCase, SpecificationError> {
    let method = match raw.method {
        Some(raw_method) => Method::from_bytes(raw_method.to_ascii_uppercase().as_bytes())
            .map_err(|_| SpecificationError::InvalidMethod(raw_method))?,
        None => Method::GET,
    };

    let paths = raw.paths.unwrap_or_default();
    if paths.is_empty() {
        return Err(SpecificationError::EmptyPaths(host.to_string()));
    }

    let sleep = match raw.sleep {
        Some(seconds) => Duration::try_from_secs_f64(seconds)
            .map_err(|_| SpecificationError::InvalidSleep(seconds))?,
        None => Duration::ZERO,
    };

    // A generated payload size overrides any literal body.
    let body = match (raw.generate_payload_size, raw.data) {
        (Some(size), _) => RequestBody::Generated(size),
        (None, Some(data)) => RequestBody::Literal(data.into_bytes()),
        (None, None) => RequestBody::None,
    };

    let expected_status = match raw.expected_status {
        Some(code) => {
            StatusCode::from_u16(code).map_err(|_| SpecificationError::InvalidStatus(code))?
        }
        None => StatusCode::OK,
    };

    let expected_response_headers = resolve_assertions(&raw.expected_response_headers)?;
    let expected_upstream_headers =
        resolve_upstream_assertions(&raw.expected_request_headers_to_upstream, collection)?;

    let mut additional_headers = Vec::with_capacity(raw.additional_request_headers.len());
    for (name, value) in &raw.additional_request_headers {
        let Some(value) = value.as_str() else {
            return Err(SpecificationError::InvalidHeaderValue(name.clone()));
        };
        additional_headers.push((parse_header_name(name)?, value.to_string()));
    }

    Ok(EndpointCase {
        method,
        paths,
        sleep,
        body,
        expected_status,
        expected_response_headers,
        expected_upstream_headers,
        additional_headers,
    })
}

/// Resolves an assertion list in a context where the collection sentinel is
/// not allowed (response headers, the collection list itself).
fn resolve_assertions(
    raw: &[RawAssertion],
) -> Result<Vec<HeaderExpectation>, SpecificationError> {
    let mut resolved = Vec::with_capacity(raw.len());
    for assertion in raw {
        if assertion.is_collection_sentinel() {
            return Err(SpecificationError::MisplacedCollectionSentinel);
        }
        resolved.push(resolve_assertion(assertion)?);
    }
    Ok(resolved)
}

/// Resolves upstream request header expectations, expanding the collection
/// sentinel: when present, the sentinel itself is dropped and the shared
/// collection headers are appended to the endpoint's own list.
fn resolve_upstream_assertions(
    raw: &[RawAssertion],
    collection: &[HeaderExpectation],
) -> Result<Vec<HeaderExpectation>, SpecificationError> {
    let mut resolved = Vec::with_capacity(raw.len());
    let mut expand = false;
    for assertion in raw {
        if assertion.is_collection_sentinel() {
            expand = true;
            continue;
        }
        resolved.push(resolve_assertion(assertion)?);
    }
    if expand {
        resolved.extend_from_slice(collection);
    }
    Ok(resolved)
}

fn resolve_assertion(raw: &RawAssertion) -> Result<HeaderExpectation, SpecificationError> {
    let tuple = match raw {
        RawAssertion::Marker(text) => {
            return Err(SpecificationError::UnexpectedString(text.clone()));
        }
        RawAssertion::Tuple(tuple) => tuple,
    };
    match tuple.as_slice() {
        [name] => Ok(HeaderExpectation::Present(parse_header_name(name)?)),
        [name, value] if value == DELETED_SENTINEL => {
            Ok(HeaderExpectation::Absent(parse_header_name(name)?))
        }
        [name, value] => Ok(HeaderExpectation::Equals(
            parse_header_name(name)?,
            value.clone(),
        )),
        other => Err(SpecificationError::BadAssertionArity(other.len())),
    }
}

fn parse_header_name(raw: &str) -> Result<HeaderName, SpecificationError> {
    HeaderName::from_bytes(raw.as_bytes())
        .map_err(|_| SpecificationError::InvalidHeaderName(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> HeaderName {
        HeaderName::from_bytes(raw.as_bytes()).unwrap()
    }

    #[test]
    fn minimal_endpoint_gets_all_defaults() {
        let spec = parse(r#"{"hosts": {"example.com": [{"paths": ["/"]}]}}"#).unwrap();
        assert_eq!(spec.hosts.len(), 1);
        let case = &spec.hosts[0].cases[0];
        assert_eq!(case.method, Method::GET);
        assert_eq!(case.expected_status, StatusCode::OK);
        assert_eq!(case.sleep, Duration::ZERO);
        assert_eq!(case.body, RequestBody::None);
        assert!(case.expected_response_headers.is_empty());
        assert!(case.expected_upstream_headers.is_empty());
        assert!(case.additional_headers.is_empty());
    }

    #[test]
    fn missing_hosts_key_fails() {
        let err = parse(r#"{"collectionHeaders": []}"#).unwrap_err();
        assert!(matches!(err, SpecificationError::MissingHosts));
    }

    #[test]
    fn host_without_cases_fails() {
        let err = parse(r#"{"hosts": {"example.com": []}}"#).unwrap_err();
        assert!(matches!(err, SpecificationError::EmptyHost(host) if host == "example.com"));
    }

    #[test]
    fn endpoint_without_paths_fails() {
        let err = parse(r#"{"hosts": {"example.com": [{"method": "GET"}]}}"#).unwrap_err();
        assert!(matches!(err, SpecificationError::EmptyPaths(_)));
    }

    #[test]
    fn malformed_json_fails() {
        assert!(matches!(
            parse("{not json").unwrap_err(),
            SpecificationError::Parse(_)
        ));
    }

    #[test]
    fn deleted_sentinel_becomes_absence() {
        let spec = parse(
            r#"{"hosts": {"example.com": [{
                "paths": ["/"],
                "expectedRequestHeadersToUpstream": [["authorization", "$deleted"]]
            }]}}"#,
        )
        .unwrap();
        assert_eq!(
            spec.hosts[0].cases[0].expected_upstream_headers,
            vec![HeaderExpectation::Absent(name("authorization"))]
        );
    }

    #[test]
    fn tuple_forms_resolve_to_presence_and_equality() {
        let spec = parse(
            r#"{"hosts": {"example.com": [{
                "paths": ["/"],
                "expectedResponseHeaders": [["x-frame-options"], ["server", "nginx"]]
            }]}}"#,
        )
        .unwrap();
        assert_eq!(
            spec.hosts[0].cases[0].expected_response_headers,
            vec![
                HeaderExpectation::Present(name("x-frame-options")),
                HeaderExpectation::Equals(name("server"), "nginx".to_string()),
            ]
        );
    }

    #[test]
    fn collection_sentinel_expands_at_load_time() {
        // Both the bare-string and one-tuple sentinel spellings expand; the
        // sentinel itself never survives into the resolved case.
        for sentinel in [r#""$collectionHeaders""#, r#"["$collectionHeaders"]"#] {
            let document = format!(
                r#"{{
                    "collectionHeaders": [["x-request-id"], ["via", "proxy"]],
                    "hosts": {{"example.com": [{{
                        "paths": ["/"],
                        "expectedRequestHeadersToUpstream": [["x-own"], {sentinel}]
                    }}]}}
                }}"#
            );
            let spec = parse(&document).unwrap();
            assert_eq!(
                spec.hosts[0].cases[0].expected_upstream_headers,
                vec![
                    HeaderExpectation::Present(name("x-own")),
                    HeaderExpectation::Present(name("x-request-id")),
                    HeaderExpectation::Equals(name("via"), "proxy".to_string()),
                ]
            );
        }
    }

    #[test]
    fn collection_sentinel_outside_upstream_context_fails() {
        let err = parse(
            r#"{"hosts": {"example.com": [{
                "paths": ["/"],
                "expectedResponseHeaders": ["$collectionHeaders"]
            }]}}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SpecificationError::MisplacedCollectionSentinel
        ));
    }

    #[test]
    fn three_element_assertion_fails() {
        let err = parse(
            r#"{"hosts": {"example.com": [{
                "paths": ["/"],
                "expectedResponseHeaders": [["a", "b", "c"]]
            }]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SpecificationError::BadAssertionArity(3)));
    }

    #[test]
    fn invalid_header_name_fails() {
        let err = parse(
            r#"{"hosts": {"example.com": [{
                "paths": ["/"],
                "expectedResponseHeaders": [["bad header name"]]
            }]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SpecificationError::InvalidHeaderName(_)));
    }

    #[test]
    fn generated_payload_overrides_literal_data() {
        let spec = parse(
            r#"{"hosts": {"example.com": [{
                "paths": ["/"],
                "data": "ignored",
                "generatePayloadSize": 1024
            }]}}"#,
        )
        .unwrap();
        assert_eq!(spec.hosts[0].cases[0].body, RequestBody::Generated(1024));
    }

    #[test]
    fn literal_data_is_kept_verbatim() {
        let spec = parse(
            r#"{"hosts": {"example.com": [{"paths": ["/"], "data": "payload"}]}}"#,
        )
        .unwrap();
        assert_eq!(
            spec.hosts[0].cases[0].body,
            RequestBody::Literal(b"payload".to_vec())
        );
    }

    #[test]
    fn additional_headers_keep_document_order() {
        let spec = parse(
            r#"{"hosts": {"example.com": [{
                "paths": ["/"],
                "additionalRequestHeaders": {"X-Second": "2", "X-First": "1"}
            }]}}"#,
        )
        .unwrap();
        let names: Vec<&str> = spec.hosts[0].cases[0]
            .additional_headers
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(names, ["x-second", "x-first"]);
    }

    #[test]
    fn non_string_additional_header_fails() {
        let err = parse(
            r#"{"hosts": {"example.com": [{
                "paths": ["/"],
                "additionalRequestHeaders": {"X-Count": 3}
            }]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SpecificationError::InvalidHeaderValue(_)));
    }

    #[test]
    fn negative_sleep_fails() {
        let err = parse(
            r#"{"hosts": {"example.com": [{"paths": ["/"], "sleep": -1}]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SpecificationError::InvalidSleep(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = load("definitely/not/here.json").unwrap_err();
        assert!(matches!(err, SpecificationError::Read { .. }));
    }

    #[test]
    fn load_reads_a_document_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.json");
        std::fs::write(&path, r#"{"hosts": {"example.com": [{"paths": ["/a", "/b"]}]}}"#)
            .unwrap();
        let spec = load(&path).unwrap();
        assert_eq!(spec.request_count(), 2);
    }
}

//! Assertion engine
//!
//! Evaluates one captured outcome against its case's expectations. The three
//! categories (status, response headers, upstream-observed request headers)
//! are independent: a failure in one never suppresses the others. Evaluation
//! is pure; the same (case, outcome) pair always yields the same results.

use crate::driver::RequestOutcome;
use crate::spec::{EndpointCase, HeaderExpectation};
use http::{HeaderMap, HeaderName};
use serde_json::Value;

/// Which of the three independent checks produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckCategory {
    /// Exact status code match
    Status,
    /// Headers of the proxy's response
    ResponseHeader,
    /// Request headers as seen by the upstream, echoed in the response body
    UpstreamHeader,
}

/// Outcome of one evaluated expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionResult {
    /// Category the expectation belongs to
    pub category: CheckCategory,
    /// Whether the expectation held
    pub passed: bool,
    /// Human-readable explanation, sufficient to diagnose without re-running
    pub detail: String,
}

impl AssertionResult {
    fn pass(category: CheckCategory, detail: String) -> Self {
        Self {
            category,
            passed: true,
            detail,
        }
    }

    fn fail(category: CheckCategory, detail: String) -> Self {
        Self {
            category,
            passed: false,
            detail,
        }
    }
}

/// Evaluates all three assertion categories for one captured outcome.
pub fn evaluate(case: &EndpointCase, outcome: &RequestOutcome) -> Vec<AssertionResult> {
    let mut results = Vec::new();
    results.push(check_status(case, outcome));
    check_response_headers(case, outcome, &mut results);
    check_upstream_headers(case, outcome, &mut results);
    results
}

fn check_status(case: &EndpointCase, outcome: &RequestOutcome) -> AssertionResult {
    if outcome.status == case.expected_status {
        AssertionResult::pass(
            CheckCategory::Status,
            format!(
                "Status code: {} (expected {})",
                outcome.status.as_u16(),
                case.expected_status.as_u16()
            ),
        )
    } else {
        AssertionResult::fail(
            CheckCategory::Status,
            format!(
                "Status code: got {}, expected {}",
                outcome.status.as_u16(),
                case.expected_status.as_u16()
            ),
        )
    }
}

fn check_response_headers(
    case: &EndpointCase,
    outcome: &RequestOutcome,
    results: &mut Vec<AssertionResult>,
) {
    for expectation in &case.expected_response_headers {
        results.push(check_response_header(expectation, &outcome.headers));
    }
}

fn check_response_header(
    expectation: &HeaderExpectation,
    headers: &HeaderMap,
) -> AssertionResult {
    let category = CheckCategory::ResponseHeader;
    match expectation {
        HeaderExpectation::Present(name) => match headers.get(name) {
            Some(_) => {
                AssertionResult::pass(category, format!("Response header present: {name}"))
            }
            None => AssertionResult::fail(
                category,
                format!(
                    "Response header missing: {name} (available: {})",
                    response_header_keys(headers)
                ),
            ),
        },
        HeaderExpectation::Equals(name, expected) => match headers.get(name) {
            Some(value) if value.as_bytes() == expected.as_bytes() => {
                AssertionResult::pass(category, format!("Response header: {name} = {expected}"))
            }
            Some(value) => AssertionResult::fail(
                category,
                format!(
                    "Response header {name}: got {:?}, expected {expected:?}",
                    String::from_utf8_lossy(value.as_bytes())
                ),
            ),
            None => AssertionResult::fail(
                category,
                format!(
                    "Response header missing: {name}, expected {expected:?} (available: {})",
                    response_header_keys(headers)
                ),
            ),
        },
        HeaderExpectation::Absent(name) => match headers.get(name) {
            None => AssertionResult::pass(category, format!("Response header removed: {name}")),
            Some(value) => AssertionResult::fail(
                category,
                format!(
                    "Response header {name} should be removed but was present with value {:?}",
                    String::from_utf8_lossy(value.as_bytes())
                ),
            ),
        },
    }
}

fn check_upstream_headers(
    case: &EndpointCase,
    outcome: &RequestOutcome,
    results: &mut Vec<AssertionResult>,
) {
    if case.expected_upstream_headers.is_empty() {
        return;
    }
    // A body that cannot be decoded kills this whole category (there is
    // nothing to look headers up in) but leaves the other categories alone.
    let observed = match parse_upstream_headers(&outcome.body) {
        Ok(observed) => observed,
        Err(reason) => {
            results.push(AssertionResult::fail(
                CheckCategory::UpstreamHeader,
                format!("Upstream header checks skipped: {reason}"),
            ));
            return;
        }
    };
    for expectation in &case.expected_upstream_headers {
        results.push(check_upstream_header(expectation, &observed));
    }
}

/// Extracts the `headers` mapping the upstream echoed back in the body.
fn parse_upstream_headers(body: &[u8]) -> Result<Vec<(String, String)>, String> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| format!("response body is not valid JSON: {e}"))?;
    let headers = value
        .get("headers")
        .ok_or_else(|| "response body has no \"headers\" member".to_string())?;
    let map = headers
        .as_object()
        .ok_or_else(|| "\"headers\" member is not an object".to_string())?;
    Ok(map
        .iter()
        .map(|(name, value)| {
            let rendered = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (name.clone(), rendered)
        })
        .collect())
}

fn check_upstream_header(
    expectation: &HeaderExpectation,
    observed: &[(String, String)],
) -> AssertionResult {
    let category = CheckCategory::UpstreamHeader;
    match expectation {
        HeaderExpectation::Present(name) => match lookup(observed, name) {
            Some(_) => {
                AssertionResult::pass(category, format!("Request header forwarded: {name}"))
            }
            None => AssertionResult::fail(
                category,
                format!(
                    "Request header not forwarded: {name} (upstream saw: {})",
                    observed_keys(observed)
                ),
            ),
        },
        HeaderExpectation::Equals(name, expected) => match lookup(observed, name) {
            Some(value) if value == expected => {
                AssertionResult::pass(category, format!("Request header: {name} = {value}"))
            }
            Some(value) => AssertionResult::fail(
                category,
                format!("Request header {name}: upstream saw {value:?}, expected {expected:?}"),
            ),
            None => AssertionResult::fail(
                category,
                format!(
                    "Request header not forwarded: {name}, expected {expected:?} (upstream saw: {})",
                    observed_keys(observed)
                ),
            ),
        },
        HeaderExpectation::Absent(name) => match lookup(observed, name) {
            None => AssertionResult::pass(category, format!("Request header removed: {name}")),
            Some(value) => AssertionResult::fail(
                category,
                format!(
                    "Request header {name} should have been removed but upstream saw {value:?}"
                ),
            ),
        },
    }
}

/// Case-insensitive lookup in the upstream's echoed header mapping.
fn lookup<'a>(observed: &'a [(String, String)], name: &HeaderName) -> Option<&'a str> {
    observed
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name.as_str()))
        .map(|(_, value)| value.as_str())
}

fn observed_keys(observed: &[(String, String)]) -> String {
    if observed.is_empty() {
        return "no headers".to_string();
    }
    observed
        .iter()
        .map(|(key, _)| key.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn response_header_keys(headers: &HeaderMap) -> String {
    if headers.is_empty() {
        return "no headers".to_string();
    }
    headers
        .keys()
        .map(HeaderName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

//! Minimal HTTP/1.1 wire client
//!
//! Each exchange uses a dedicated connection with `Connection: close`. The
//! proxy under test sees every request exactly as built, headers included,
//! in order, unmodified by any connection pool.

use bytes::BytesMut;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("connect timeout after {0:?}")]
    ConnectTimeout(Duration),
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("response too large: {got} bytes, limit {limit}")]
    ResponseTooLarge { got: usize, limit: usize },
    #[error("connection closed before a complete response arrived")]
    TruncatedResponse,
}

/// Configuration for the wire client
#[derive(Debug, Clone)]
pub struct WireConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// End-to-end timeout covering write and read of one exchange
    pub request_timeout: Duration,
    /// Buffer size for reading data
    pub buffer_size: usize,
    /// Maximum response size to prevent memory exhaustion
    pub max_response_size: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            buffer_size: 8192,
            max_response_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// A fully-specified request ready to go on the wire.
#[derive(Debug, Clone)]
pub struct WireRequest<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    /// Header set in send order; must already include `Host`
    pub headers: &'a [(HeaderName, String)],
    pub body: &'a [u8],
}

/// A complete parsed response.
#[derive(Debug)]
pub struct WireResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// One-connection-per-request HTTP client.
pub struct WireClient {
    config: WireConfig,
}

impl WireClient {
    /// Creates a client with the given configuration.
    pub fn new(config: WireConfig) -> Self {
        Self { config }
    }

    /// Issues one request on a fresh connection and reads the response to
    /// completion.
    pub async fn exchange(
        &self,
        addr: SocketAddr,
        request: &WireRequest<'_>,
    ) -> Result<WireResponse, WireError> {
        let stream = timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| WireError::ConnectTimeout(self.config.connect_timeout))??;
        timeout(
            self.config.request_timeout,
            self.send_and_receive(stream, request),
        )
        .await
        .map_err(|_| WireError::RequestTimeout(self.config.request_timeout))?
    }

    async fn send_and_receive(
        &self,
        mut stream: TcpStream,
        request: &WireRequest<'_>,
    ) -> Result<WireResponse, WireError> {
        stream.write_all(&encode_request(request)).await?;
        stream.flush().await?;

        let mut raw = BytesMut::with_capacity(self.config.buffer_size);
        let mut chunk = vec![0u8; self.config.buffer_size];
        let mut eof = false;
        loop {
            match try_parse_response(&raw, eof)? {
                Some(response) => return Ok(response),
                None if eof => return Err(WireError::TruncatedResponse),
                None => {}
            }

            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                eof = true;
            } else {
                if raw.len() + n > self.config.max_response_size {
                    return Err(WireError::ResponseTooLarge {
                        got: raw.len() + n,
                        limit: self.config.max_response_size,
                    });
                }
                raw.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

/// Serializes the request head and body into one write.
fn encode_request(request: &WireRequest<'_>) -> Vec<u8> {
    let mut head = format!("{} {} HTTP/1.1\r\n", request.method, request.path);
    for (name, value) in request.headers {
        head.push_str(name.as_str());
        head.push_str(": ");
        head.push_str(value);
        head.push_str("\r\n");
    }
    let has_header = |wanted: &HeaderName| request.headers.iter().any(|(name, _)| name == wanted);
    if !request.body.is_empty() && !has_header(&header::CONTENT_LENGTH) {
        head.push_str(&format!("Content-Length: {}\r\n", request.body.len()));
    }
    if !has_header(&header::CONNECTION) {
        head.push_str("Connection: close\r\n");
    }
    head.push_str("\r\n");

    let mut wire = head.into_bytes();
    wire.extend_from_slice(request.body);
    wire
}

/// Attempts to parse a complete response out of the bytes read so far.
///
/// Returns `Ok(None)` while more data is needed. Body framing is resolved in
/// order: chunked transfer coding, then `Content-Length`, then (only at EOF)
/// everything up to connection close.
fn try_parse_response(raw: &[u8], eof: bool) -> Result<Option<WireResponse>, WireError> {
    let mut header_storage = [httparse::EMPTY_HEADER; 64];
    let mut parsed = httparse::Response::new(&mut header_storage);
    let head_len = match parsed.parse(raw) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => {
            return Err(WireError::MalformedResponse(format!(
                "invalid response head: {e}"
            )));
        }
    };

    let code = parsed
        .code
        .ok_or_else(|| WireError::MalformedResponse("missing status code".to_string()))?;
    let status = StatusCode::from_u16(code)
        .map_err(|_| WireError::MalformedResponse(format!("invalid status code {code}")))?;

    let mut headers = HeaderMap::with_capacity(parsed.headers.len());
    for h in parsed.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|_| WireError::MalformedResponse(format!("invalid header name {:?}", h.name)))?;
        let value = HeaderValue::from_bytes(h.value).map_err(|_| {
            WireError::MalformedResponse(format!("invalid value for header {:?}", h.name))
        })?;
        headers.append(name, value);
    }

    let body_bytes = &raw[head_len..];

    let is_chunked = headers
        .get(header::TRANSFER_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"));
    if is_chunked {
        return match decode_chunked(body_bytes)? {
            Some(body) => Ok(Some(WireResponse { status, headers, body })),
            None => Ok(None),
        };
    }

    if let Some(value) = headers.get(header::CONTENT_LENGTH) {
        let length: usize = value
            .to_str()
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .ok_or_else(|| WireError::MalformedResponse("invalid Content-Length".to_string()))?;
        if body_bytes.len() < length {
            return Ok(None);
        }
        return Ok(Some(WireResponse {
            status,
            headers,
            body: body_bytes[..length].to_vec(),
        }));
    }

    // No framing header: the body runs to connection close.
    if eof {
        return Ok(Some(WireResponse {
            status,
            headers,
            body: body_bytes.to_vec(),
        }));
    }
    Ok(None)
}

/// Decodes a chunked body; `Ok(None)` means the terminal chunk has not
/// arrived yet. Trailers are accepted and discarded.
fn decode_chunked(mut raw: &[u8]) -> Result<Option<Vec<u8>>, WireError> {
    let mut body = Vec::new();
    loop {
        let Some(line_end) = find_crlf(raw) else {
            return Ok(None);
        };
        let size_line = std::str::from_utf8(&raw[..line_end])
            .map_err(|_| WireError::MalformedResponse("non-ASCII chunk size line".to_string()))?;
        let size_text = size_line.split(';').next().unwrap_or(size_line).trim();
        let size = usize::from_str_radix(size_text, 16).map_err(|_| {
            WireError::MalformedResponse(format!("invalid chunk size {size_text:?}"))
        })?;

        if size == 0 {
            return Ok(Some(body));
        }

        let chunk_start = line_end + 2;
        if raw.len() < chunk_start + size + 2 {
            return Ok(None);
        }
        body.extend_from_slice(&raw[chunk_start..chunk_start + size]);
        raw = &raw[chunk_start + size + 2..];
    }
}

fn find_crlf(raw: &[u8]) -> Option<usize> {
    raw.windows(2).position(|window| window == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Serves exactly one connection: reads until the request head is in,
    /// then writes `response` and closes.
    async fn one_shot_server(response: Vec<u8>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buffer = vec![0u8; 8192];
            let mut seen = Vec::new();
            loop {
                let n = stream.read(&mut buffer).await.unwrap();
                seen.extend_from_slice(&buffer[..n]);
                if n == 0 || seen.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            stream.write_all(&response).await.unwrap();
            stream.flush().await.unwrap();
        });
        addr
    }

    fn get_request<'a>(headers: &'a [(HeaderName, String)]) -> WireRequest<'a> {
        WireRequest {
            method: &Method::GET,
            path: "/",
            headers,
            body: b"",
        }
    }

    #[tokio::test]
    async fn parses_content_length_response() {
        let addr = one_shot_server(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello".to_vec(),
        )
        .await;
        let headers = vec![(header::HOST, "example.com".to_string())];
        let client = WireClient::new(WireConfig::default());
        let response = client.exchange(addr, &get_request(&headers)).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, b"hello");
        assert_eq!(
            response.headers.get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
    }

    #[tokio::test]
    async fn parses_chunked_response() {
        let addr = one_shot_server(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n"
                .to_vec(),
        )
        .await;
        let headers = vec![(header::HOST, "example.com".to_string())];
        let client = WireClient::new(WireConfig::default());
        let response = client.exchange(addr, &get_request(&headers)).await.unwrap();
        assert_eq!(response.body, b"hello world");
    }

    #[tokio::test]
    async fn reads_to_eof_without_framing_headers() {
        let addr =
            one_shot_server(b"HTTP/1.1 204 No Content\r\nServer: mini\r\n\r\n".to_vec()).await;
        let headers = vec![(header::HOST, "example.com".to_string())];
        let client = WireClient::new(WireConfig::default());
        let response = client.exchange(addr, &get_request(&headers)).await.unwrap();
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn truncated_response_is_an_error() {
        let addr = one_shot_server(
            b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort".to_vec(),
        )
        .await;
        let headers = vec![(header::HOST, "example.com".to_string())];
        let client = WireClient::new(WireConfig::default());
        let err = client
            .exchange(addr, &get_request(&headers))
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::TruncatedResponse));
    }

    #[tokio::test]
    async fn connect_to_dead_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let headers = vec![(header::HOST, "example.com".to_string())];
        let client = WireClient::new(WireConfig {
            connect_timeout: Duration::from_millis(200),
            request_timeout: Duration::from_millis(200),
            ..Default::default()
        });
        assert!(client.exchange(addr, &get_request(&headers)).await.is_err());
    }

    #[test]
    fn encode_includes_headers_in_order_and_framing() {
        let headers = vec![
            (header::HOST, "example.com".to_string()),
            (
                HeaderName::from_bytes(b"x-api-key").unwrap(),
                "secret".to_string(),
            ),
        ];
        let request = WireRequest {
            method: &Method::POST,
            path: "/submit",
            headers: &headers,
            body: b"payload",
        };
        let wire = String::from_utf8(encode_request(&request)).unwrap();
        assert!(wire.starts_with("POST /submit HTTP/1.1\r\n"));
        let host_at = wire.find("host: example.com\r\n").unwrap();
        let key_at = wire.find("x-api-key: secret\r\n").unwrap();
        assert!(host_at < key_at);
        assert!(wire.contains("Content-Length: 7\r\n"));
        assert!(wire.contains("Connection: close\r\n"));
        assert!(wire.ends_with("\r\n\r\npayload"));
    }

    #[test]
    fn encode_does_not_duplicate_explicit_framing_headers() {
        let headers = vec![
            (header::HOST, "example.com".to_string()),
            (header::CONNECTION, "keep-alive".to_string()),
        ];
        let request = WireRequest {
            method: &Method::GET,
            path: "/",
            headers: &headers,
            body: b"",
        };
        let wire = String::from_utf8(encode_request(&request)).unwrap();
        assert!(wire.contains("connection: keep-alive\r\n"));
        assert!(!wire.contains("Connection: close"));
    }

    #[test]
    fn chunked_decoder_waits_for_terminal_chunk() {
        assert_eq!(decode_chunked(b"5\r\nhel").unwrap(), None);
        assert_eq!(
            decode_chunked(b"5\r\nhello\r\n0\r\n\r\n").unwrap(),
            Some(b"hello".to_vec())
        );
    }

    #[test]
    fn chunked_decoder_rejects_garbage_sizes() {
        assert!(decode_chunked(b"zz\r\nhello\r\n").is_err());
    }
}

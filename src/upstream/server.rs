use super::UpstreamConfig;
use crate::{HarnessError, Result};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::{signal, time::timeout};
use tracing::{error, info, warn};

/// Hard cap on a single echoed request.
const MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

/// The JSON document the upstream answers with: the request as it saw it.
#[derive(Debug, Serialize)]
struct EchoBody<'a> {
    method: &'a str,
    path: &'a str,
    headers: serde_json::Map<String, serde_json::Value>,
    body: String,
}

/// One fully-read inbound request.
#[derive(Debug)]
struct ObservedRequest {
    method: String,
    path: String,
    /// Names lowercased, declaration order preserved
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

/// Mock upstream that echoes every request back as a JSON description.
///
/// Stands in for the real backend behind the proxy under test: the harness
/// asserts on the `headers` mapping this server reports, which is exactly
/// the header set the proxy forwarded.
pub struct UpstreamServer {
    config: UpstreamConfig,
    shutdown_signal: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl UpstreamServer {
    /// Creates a server with the given configuration.
    pub fn new(config: UpstreamConfig) -> Self {
        let (shutdown_signal, _) = tokio::sync::broadcast::channel(1);
        Self {
            config,
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    /// Binds to the configured address and serves until shutdown.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections on an already-bound listener.
    ///
    /// Useful when the caller bound to port 0 and needs the actual address
    /// before the server starts accepting.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(address = %listener.local_addr()?, "Mock upstream listening");

        let connection_count = Arc::new(AtomicUsize::new(0));
        let mut shutdown_rx = self.shutdown_signal.subscribe();

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let current = connection_count.load(Ordering::SeqCst);
                            if current >= self.config.max_connections {
                                warn!(%addr, current, limit = self.config.max_connections, "Connection rejected: limit reached");
                                continue;
                            }

                            connection_count.fetch_add(1, Ordering::SeqCst);
                            let config = self.config.clone();
                            let connection_count = connection_count.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, config).await {
                                    error!(%addr, error = %e, "Error handling connection");
                                }
                                connection_count.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal, stopping mock upstream");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received internal shutdown signal, stopping mock upstream");
                    break;
                }
            }
        }

        info!("Mock upstream stopped");
        Ok(())
    }

    /// Returns a sender that can be used to gracefully shut the server down.
    pub fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }
}

/// Reads one request, answers with its JSON description, closes.
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    config: UpstreamConfig,
) -> Result<()> {
    let request = timeout(
        config.read_timeout,
        read_request(&mut stream, config.buffer_size),
    )
    .await
    .map_err(|_| HarnessError::Timeout(format!("read timeout from {addr}")))??;

    let response = encode_echo_response(&request);
    timeout(config.write_timeout, stream.write_all(&response))
        .await
        .map_err(|_| HarnessError::Timeout(format!("write timeout to {addr}")))??;
    stream.flush().await?;

    info!(%addr, method = %request.method, path = %request.path, "Echoed request");
    Ok(())
}

async fn read_request(stream: &mut TcpStream, buffer_size: usize) -> Result<ObservedRequest> {
    let mut raw = Vec::with_capacity(buffer_size);
    let mut chunk = vec![0u8; buffer_size];
    loop {
        if let Some(request) = try_parse_request(&raw)? {
            return Ok(request);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HarnessError::Protocol(
                "connection closed mid-request".to_string(),
            ));
        }
        if raw.len() + n > MAX_REQUEST_SIZE {
            return Err(HarnessError::Protocol(format!(
                "request too large: over {MAX_REQUEST_SIZE} bytes"
            )));
        }
        raw.extend_from_slice(&chunk[..n]);
    }
}

/// Attempts to parse a complete request (head plus `Content-Length` body)
/// out of the bytes read so far; `Ok(None)` means more data is needed.
fn try_parse_request(raw: &[u8]) -> Result<Option<ObservedRequest>> {
    let mut header_storage = [httparse::EMPTY_HEADER; 64];
    let mut parsed = httparse::Request::new(&mut header_storage);
    let head_len = match parsed.parse(raw) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => {
            return Err(HarnessError::Protocol(format!("invalid request head: {e}")));
        }
    };

    let mut headers = Vec::with_capacity(parsed.headers.len());
    let mut content_length = 0usize;
    for h in parsed.headers.iter() {
        let value = String::from_utf8_lossy(h.value).into_owned();
        if h.name.eq_ignore_ascii_case("content-length") {
            content_length = value
                .trim()
                .parse()
                .map_err(|_| HarnessError::Protocol("invalid Content-Length".to_string()))?;
        }
        headers.push((h.name.to_ascii_lowercase(), value));
    }

    let body_bytes = &raw[head_len..];
    if body_bytes.len() < content_length {
        return Ok(None);
    }

    Ok(Some(ObservedRequest {
        method: parsed.method.unwrap_or("GET").to_string(),
        path: parsed.path.unwrap_or("/").to_string(),
        headers,
        body: body_bytes[..content_length].to_vec(),
    }))
}

fn encode_echo_response(request: &ObservedRequest) -> Vec<u8> {
    let mut header_map = serde_json::Map::new();
    for (name, value) in &request.headers {
        header_map.insert(name.clone(), serde_json::Value::String(value.clone()));
    }
    let echo = EchoBody {
        method: &request.method,
        path: &request.path,
        headers: header_map,
        body: String::from_utf8_lossy(&request.body).into_owned(),
    };
    let payload = serde_json::to_vec(&echo).unwrap_or_else(|_| b"{}".to_vec());

    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        payload.len()
    )
    .into_bytes();
    response.extend_from_slice(&payload);
    response
}

//! Readiness probing for the target under test
//!
//! The prober gates the whole run: no test traffic is sent until the target
//! accepts a connection, and a target that never comes up within the window
//! aborts the run before a single assertion is evaluated.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Configuration for the readiness probe
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Address of the target under test
    pub target: SocketAddr,
    /// Total wait allowed for the target to become reachable
    pub max_wait: Duration,
    /// Delay between attempts
    pub poll_interval: Duration,
    /// Per-attempt connection timeout
    pub attempt_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target: "127.0.0.1:80".parse().unwrap(),
            max_wait: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(2),
        }
    }
}

/// Polls the target until it accepts a connection or the window elapses.
pub struct ReadinessProbe {
    config: ProbeConfig,
}

impl ReadinessProbe {
    /// Creates a probe for the configured target.
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Waits for the target to become reachable.
    ///
    /// An accepted connection counts as ready no matter what the target
    /// answers, status included; the specification format has no field for a
    /// health path, so readiness is connection-level on the root path.
    /// Connection refusal means "not yet" and is retried; any other error is
    /// logged and retried as well. Returns `false` once `max_wait` elapses
    /// without a single successful connection.
    pub async fn wait_for_ready(&self) -> bool {
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match timeout(self.config.attempt_timeout, self.connect_once()).await {
                Ok(Ok(())) => {
                    info!(
                        target = %self.config.target,
                        attempt,
                        elapsed = ?started.elapsed(),
                        "Target is ready"
                    );
                    return true;
                }
                Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                    debug!(
                        attempt,
                        elapsed = ?started.elapsed(),
                        "Connection refused, target not up yet"
                    );
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "Probe attempt failed, retrying");
                }
                Err(_) => {
                    warn!(
                        attempt,
                        timeout = ?self.config.attempt_timeout,
                        "Probe attempt timed out, retrying"
                    );
                }
            }

            if started.elapsed() + self.config.poll_interval >= self.config.max_wait {
                warn!(
                    target = %self.config.target,
                    attempts = attempt,
                    waited = ?started.elapsed(),
                    "Target never became ready"
                );
                return false;
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// One probe attempt: connect and send a minimal request on the root
    /// path so the attempt shows up in the target's logs.
    async fn connect_once(&self) -> std::io::Result<()> {
        let mut stream = TcpStream::connect(self.config.target).await?;
        let head = format!(
            "GET / HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.config.target
        );
        stream.write_all(head.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn quick_config(target: SocketAddr) -> ProbeConfig {
        ProbeConfig {
            target,
            max_wait: Duration::from_millis(400),
            poll_interval: Duration::from_millis(50),
            attempt_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn listening_target_is_ready_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Keep accepting so the probe's write lands somewhere.
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let probe = ReadinessProbe::new(quick_config(addr));
        assert!(probe.wait_for_ready().await);
    }

    #[tokio::test]
    async fn absent_target_times_out() {
        // Bind then drop to get a port with nothing listening on it.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = ReadinessProbe::new(quick_config(addr));
        assert!(!probe.wait_for_ready().await);
    }

    #[tokio::test]
    async fn target_coming_up_mid_window_is_detected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = ReadinessProbe::new(ProbeConfig {
            target: addr,
            max_wait: Duration::from_secs(5),
            poll_interval: Duration::from_millis(50),
            attempt_timeout: Duration::from_millis(200),
        });

        let late_server = tokio::spawn(async move {
            sleep(Duration::from_millis(150)).await;
            let listener = TcpListener::bind(addr).await.unwrap();
            loop {
                let _ = listener.accept().await;
            }
        });

        assert!(probe.wait_for_ready().await);
        late_server.abort();
    }
}

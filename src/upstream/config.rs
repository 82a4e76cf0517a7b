use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the mock upstream echo server
///
/// # Examples
///
/// ```
/// use httptests::upstream::UpstreamConfig;
///
/// let config = UpstreamConfig::default();
/// assert_eq!(config.max_connections, 100);
/// ```
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Buffer size for reading requests
    pub buffer_size: usize,
    /// Read timeout per connection
    pub read_timeout: Duration,
    /// Write timeout per connection
    pub write_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5001".parse().unwrap(),
            max_connections: 100,
            buffer_size: 8192,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
        }
    }
}

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the request driver
///
/// # Examples
///
/// ```
/// use httptests::driver::DriverConfig;
/// use std::time::Duration;
///
/// let config = DriverConfig {
///     base_addr: "127.0.0.1:80".parse().unwrap(),
///     connect_timeout: Duration::from_secs(10),
///     request_timeout: Duration::from_secs(10),
///     buffer_size: 8192,
///     max_response_size: 10 * 1024 * 1024,
/// };
/// ```
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Address of the proxy under test; every request goes here, with the
    /// declared host carried in the `Host` header
    pub base_addr: SocketAddr,
    /// Timeout for establishing each connection
    pub connect_timeout: Duration,
    /// End-to-end timeout for each request
    pub request_timeout: Duration,
    /// Buffer size for reading responses
    pub buffer_size: usize,
    /// Maximum response size to prevent memory exhaustion
    pub max_response_size: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            base_addr: "127.0.0.1:80".parse().unwrap(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            buffer_size: 8192,
            max_response_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

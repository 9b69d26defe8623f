use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

use crate::types::PortOutcome;

/// Upper bound on how long to wait for an unsolicited banner.
pub const DEFAULT_BANNER_TIMEOUT: Duration = Duration::from_millis(500);
/// Maximum number of banner bytes kept.
pub const DEFAULT_BANNER_LIMIT: usize = 1024;

/// Probes a single port. Implementations must return within a bounded time
/// derived from `timeout` and must not touch shared state.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, addr: IpAddr, port: u16, timeout: Duration) -> PortOutcome;
}

/// TCP connect prober with a passive banner read.
#[derive(Debug, Clone)]
pub struct TcpProber {
    banner_timeout: Duration,
    banner_limit: usize,
}

impl TcpProber {
    pub fn new() -> Self {
        Self {
            banner_timeout: DEFAULT_BANNER_TIMEOUT,
            banner_limit: DEFAULT_BANNER_LIMIT,
        }
    }

    pub fn with_banner_timeout(mut self, timeout: Duration) -> Self {
        self.banner_timeout = timeout;
        self
    }

    pub fn with_banner_limit(mut self, limit: usize) -> Self {
        self.banner_limit = limit;
        self
    }

    /// Read up to `banner_limit` bytes, waiting at most `wait`. Silence, EOF and read
    /// errors all yield an empty banner.
    async fn read_banner(&self, stream: &mut TcpStream, wait: Duration) -> String {
        let mut buf = vec![0u8; self.banner_limit];
        match time::timeout(wait, stream.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => {
                buf.truncate(n);
                String::from_utf8_lossy(&buf).trim().to_string()
            }
            _ => String::new(),
        }
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, addr: IpAddr, port: u16, timeout: Duration) -> PortOutcome {
        let target = SocketAddr::new(addr, port);
        let start = Instant::now();
        match time::timeout(timeout, TcpStream::connect(target)).await {
            Ok(Ok(mut stream)) => {
                let latency = start.elapsed();
                let banner = self
                    .read_banner(&mut stream, timeout.min(self.banner_timeout))
                    .await;
                // `stream` is dropped here, closing the socket.
                PortOutcome::open(port, latency, banner)
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                PortOutcome::closed(port, start.elapsed())
            }
            Ok(Err(e)) => {
                tracing::trace!(port, error = %e, "connect failed");
                PortOutcome::error(port)
            }
            Err(_elapsed) => PortOutcome::filtered(port),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use time::OffsetDateTime;

use crate::target::Target;

/// Terminal state of a single port probe.
///
/// `Closed` means the host actively refused the connection. `Filtered` means the
/// connect attempt timed out, and `Error` covers every other failure (unreachable
/// network, resets, a crashed probe task). Reports may merge the last two.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    Error,
}

impl PortState {
    pub fn is_open(self) -> bool {
        matches!(self, PortState::Open)
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortState::Open => write!(f, "open"),
            PortState::Closed => write!(f, "closed"),
            PortState::Filtered => write!(f, "filtered"),
            PortState::Error => write!(f, "error"),
        }
    }
}

/// Outcome of probing one port, optionally enriched by the classifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortOutcome {
    pub port: u16,
    pub state: PortState,
    /// Unsolicited bytes read right after connecting, lossily decoded.
    /// `Some("")` for an open but silent service, `None` when not connected.
    pub banner: Option<String>,
    pub service: Option<String>,
    pub version: Option<String>,
    pub latency: Option<Duration>,
}

impl PortOutcome {
    pub fn open(port: u16, latency: Duration, banner: String) -> Self {
        Self {
            port,
            state: PortState::Open,
            banner: Some(banner),
            service: None,
            version: None,
            latency: Some(latency),
        }
    }

    pub fn closed(port: u16, latency: Duration) -> Self {
        Self {
            port,
            state: PortState::Closed,
            banner: None,
            service: None,
            version: None,
            latency: Some(latency),
        }
    }

    pub fn filtered(port: u16) -> Self {
        Self::failed(port, PortState::Filtered)
    }

    pub fn error(port: u16) -> Self {
        Self::failed(port, PortState::Error)
    }

    fn failed(port: u16, state: PortState) -> Self {
        Self {
            port,
            state,
            banner: None,
            service: None,
            version: None,
            latency: None,
        }
    }
}

/// Number of probed ports per terminal state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub open: u64,
    pub closed: u64,
    pub filtered: u64,
    pub error: u64,
}

impl StateCounts {
    pub fn record(&mut self, state: PortState) {
        match state {
            PortState::Open => self.open += 1,
            PortState::Closed => self.closed += 1,
            PortState::Filtered => self.filtered += 1,
            PortState::Error => self.error += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.open + self.closed + self.filtered + self.error
    }
}

/// Aggregate result of one scan.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub target: Target,
    pub started_at: OffsetDateTime,
    pub finished_at: OffsetDateTime,
    /// Open ports only, ascending by port number.
    pub outcomes: Vec<PortOutcome>,
    pub counts: StateCounts,
    pub ports_total: u64,
    /// False when the scan was cancelled or hit its deadline before every port finished.
    pub complete: bool,
    pub findings: Vec<String>,
}

impl ScanResult {
    pub fn address(&self) -> IpAddr {
        self.target.addr
    }

    pub fn ports_scanned(&self) -> u64 {
        self.counts.total()
    }

    pub fn is_partial(&self) -> bool {
        !self.complete
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .try_into()
            .unwrap_or_default()
    }
}

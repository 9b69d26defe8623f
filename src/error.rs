use thiserror::Error;

/// Errors produced while parsing a port specification such as `1-1000` or `22,80,443`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortSpecError {
    #[error("empty port specification")]
    Empty,

    #[error("invalid port value: {0:?}")]
    InvalidNumber(String),

    #[error("port out of range: {0} (must be 0-65535)")]
    OutOfRange(u32),

    #[error("invalid range {start}-{end} (start > end)")]
    ReversedRange { start: u16, end: u16 },
}

/// Fatal preconditions. Anything in here stops a scan before a single probe is sent;
/// per-port network failures are recorded as port states instead.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("cannot resolve host {host:?}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("host {0:?} resolved to no addresses")]
    NoAddress(String),

    #[error(transparent)]
    PortSpec(#[from] PortSpecError),

    #[error("invalid scan configuration: {0}")]
    InvalidConfig(String),
}

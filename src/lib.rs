//! Library crate for portsweep: a concurrent TCP connect scanner with banner capture,
//! service classification and basic risk advisories.
pub mod assess;
pub mod classify;
pub mod error;
pub mod ports;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod tables;
pub mod target;
pub mod types;

pub use error::{PortSpecError, ScanError};
pub use ports::PortSpec;
pub use scanner::{ScanConfig, Scanner};
pub use target::{resolve_target, Target};
pub use types::{PortOutcome, PortState, ScanResult};

use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use tokio::net::lookup_host;
use tracing::debug;

use crate::error::ScanError;

/// A scan target: the name the user gave and the single address it resolved to.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub addr: IpAddr,
}

impl Target {
    pub fn from_addr(addr: IpAddr) -> Self {
        Self {
            name: addr.to_string(),
            addr,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.addr.to_string() {
            write!(f, "{}", self.addr)
        } else {
            write!(f, "{} ({})", self.name, self.addr)
        }
    }
}

/// Resolve a hostname or IP literal once, before any probing starts.
///
/// IPv4 results are preferred when a name resolves to both families.
pub async fn resolve_target(host: &str) -> Result<Target, ScanError> {
    let host = host.trim();
    if let Ok(addr) = host.parse::<IpAddr>() {
        return Ok(Target::from_addr(addr));
    }

    let addrs: Vec<IpAddr> = lookup_host((host, 0))
        .await
        .map_err(|source| ScanError::Resolve {
            host: host.to_string(),
            source,
        })?
        .map(|sa| sa.ip())
        .collect();
    debug!(host, resolved = ?addrs, "resolved target");

    let addr = addrs
        .iter()
        .copied()
        .find(IpAddr::is_ipv4)
        .or_else(|| addrs.first().copied())
        .ok_or_else(|| ScanError::NoAddress(host.to_string()))?;

    Ok(Target {
        name: host.to_string(),
        addr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn ip_literal_skips_lookup() {
        let t = resolve_target(" 127.0.0.1 ").await.unwrap();
        assert_eq!(t.addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(t.to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn unresolvable_host_fails() {
        let err = resolve_target("no-such-host.invalid").await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::Resolve { .. } | ScanError::NoAddress(_)
        ));
    }

    #[test]
    fn display_shows_name_and_addr() {
        let t = Target {
            name: "example.test".into(),
            addr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
        };
        assert_eq!(t.to_string(), "example.test (10.0.0.5)");
    }
}

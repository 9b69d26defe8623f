use crate::tables::ServiceTable;
use crate::types::PortOutcome;

/// Return a copy of `outcome` labelled with its service name.
///
/// Only open ports are labelled; other outcomes come back unchanged. The label is a
/// pure port lookup. The banner, when present, only feeds the `version` field.
pub fn classify(outcome: &PortOutcome, table: &ServiceTable) -> PortOutcome {
    let mut enriched = outcome.clone();
    if !outcome.state.is_open() {
        return enriched;
    }
    enriched.service = Some(table.lookup(outcome.port).to_string());
    enriched.version = outcome.banner.as_deref().and_then(banner_version);
    enriched
}

/// Pull a software/version string out of common banner shapes.
pub fn banner_version(banner: &str) -> Option<String> {
    for line in banner.lines().map(str::trim) {
        // SSH-2.0-OpenSSH_8.9p1 Ubuntu-3
        if let Some(rest) = line.strip_prefix("SSH-") {
            return rest
                .split_once('-')
                .map(|(_, software)| software.trim().to_string())
                .filter(|s| !s.is_empty());
        }
        // 220 ProFTPD Server ready / 220 mail.example ESMTP Postfix
        if let Some(rest) = line.strip_prefix("220") {
            let rest = rest.trim_start_matches(['-', ' ']).trim();
            return (!rest.is_empty()).then(|| rest.to_string());
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("server") && !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::UNKNOWN_SERVICE;
    use std::time::Duration;

    fn open(port: u16, banner: &str) -> PortOutcome {
        PortOutcome::open(port, Duration::from_millis(1), banner.to_string())
    }

    #[test]
    fn labels_known_and_unknown_ports() {
        let table = ServiceTable::default();
        assert_eq!(classify(&open(22, ""), &table).service.as_deref(), Some("SSH"));
        assert_eq!(classify(&open(80, ""), &table).service.as_deref(), Some("HTTP"));
        assert_eq!(
            classify(&open(31337, ""), &table).service.as_deref(),
            Some(UNKNOWN_SERVICE)
        );
    }

    #[test]
    fn is_pure() {
        let table = ServiceTable::default();
        let input = open(443, "");
        let a = classify(&input, &table);
        let b = classify(&input, &table);
        assert_eq!(a, b);
        assert!(input.service.is_none());
    }

    #[test]
    fn leaves_non_open_ports_alone() {
        let table = ServiceTable::default();
        let closed = PortOutcome::closed(22, Duration::from_millis(1));
        assert_eq!(classify(&closed, &table), closed);
    }

    #[test]
    fn extracts_versions_from_banners() {
        assert_eq!(
            banner_version("SSH-2.0-OpenSSH_8.9").as_deref(),
            Some("OpenSSH_8.9")
        );
        assert_eq!(
            banner_version("220 ProFTPD 1.3.5 Server").as_deref(),
            Some("ProFTPD 1.3.5 Server")
        );
        assert_eq!(
            banner_version("HTTP/1.1 400 Bad Request\r\nServer: nginx/1.18.0\r\n").as_deref(),
            Some("nginx/1.18.0")
        );
        assert_eq!(banner_version("+OK ready"), None);
        assert_eq!(banner_version(""), None);
    }

    #[test]
    fn version_is_recorded_on_classify() {
        let table = ServiceTable::default();
        let out = classify(&open(22, "SSH-2.0-OpenSSH_8.9"), &table);
        assert_eq!(out.version.as_deref(), Some("OpenSSH_8.9"));
        assert_eq!(out.banner.as_deref(), Some("SSH-2.0-OpenSSH_8.9"));
    }
}

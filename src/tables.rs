//! Static lookup data consumed by the classifier and the risk heuristic.
//!
//! Both tables are plain data so they can be swapped or extended without
//! touching the scan engine.

use std::collections::HashMap;

/// Label used for ports missing from the service table.
pub const UNKNOWN_SERVICE: &str = "Unknown";

const DEFAULT_SERVICES: &[(u16, &str)] = &[
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (993, "IMAPS"),
    (995, "POP3S"),
    (1433, "MSSQL"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5000, "Flask/Docker"),
    (5432, "PostgreSQL"),
    (6379, "Redis"),
    (8080, "HTTP-Alt"),
    (9200, "Elasticsearch"),
    (11211, "Memcached"),
    (27017, "MongoDB"),
];

/// Port number to service label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTable {
    entries: HashMap<u16, String>,
}

impl ServiceTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Build from `(port, label)` pairs. The first entry for a port wins.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u16, S)>,
        S: Into<String>,
    {
        let mut table = Self::empty();
        for (port, label) in entries {
            table.entries.entry(port).or_insert_with(|| label.into());
        }
        table
    }

    /// Add or replace a single mapping.
    pub fn insert(&mut self, port: u16, label: impl Into<String>) {
        self.entries.insert(port, label.into());
    }

    pub fn get(&self, port: u16) -> Option<&str> {
        self.entries.get(&port).map(String::as_str)
    }

    /// Service label for `port`, falling back to [`UNKNOWN_SERVICE`].
    pub fn lookup(&self, port: u16) -> &str {
        self.get(port).unwrap_or(UNKNOWN_SERVICE)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ServiceTable {
    fn default() -> Self {
        Self::from_entries(DEFAULT_SERVICES.iter().copied())
    }
}

/// Broad family a risk rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskCategory {
    Cleartext,
    ExposedDatabase,
    RemoteAccess,
}

/// One advisory, triggered when an open port matches by number or by service label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskRule {
    pub category: RiskCategory,
    pub ports: Vec<u16>,
    pub services: Vec<String>,
    pub advisory: String,
}

impl RiskRule {
    pub fn new(category: RiskCategory, advisory: impl Into<String>) -> Self {
        Self {
            category,
            ports: Vec::new(),
            services: Vec::new(),
            advisory: advisory.into(),
        }
    }

    pub fn on_ports(mut self, ports: &[u16]) -> Self {
        self.ports.extend_from_slice(ports);
        self
    }

    pub fn on_services(mut self, services: &[&str]) -> Self {
        self.services.extend(services.iter().map(|s| s.to_string()));
        self
    }

    /// Label comparison is case-insensitive.
    pub fn matches(&self, port: u16, service: Option<&str>) -> bool {
        self.ports.contains(&port)
            || service.is_some_and(|svc| self.services.iter().any(|s| s.eq_ignore_ascii_case(svc)))
    }
}

/// Ordered set of risk rules. Evaluation order is table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskRules {
    rules: Vec<RiskRule>,
}

impl RiskRules {
    pub fn new(rules: Vec<RiskRule>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: RiskRule) {
        self.rules.push(rule);
    }

    pub fn iter(&self) -> impl Iterator<Item = &RiskRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RiskRules {
    fn default() -> Self {
        use RiskCategory::*;
        Self::new(vec![
            RiskRule::new(Cleartext, "FTP may allow anonymous access")
                .on_ports(&[21])
                .on_services(&["FTP"]),
            RiskRule::new(Cleartext, "Telnet sends data in plaintext")
                .on_ports(&[23])
                .on_services(&["Telnet"]),
            RiskRule::new(Cleartext, "HTTP serves content without transport encryption")
                .on_ports(&[80])
                .on_services(&["HTTP"]),
            RiskRule::new(
                RemoteAccess,
                "SSH exposed - restrict access and disable password authentication",
            )
            .on_ports(&[22])
            .on_services(&["SSH"]),
            RiskRule::new(RemoteAccess, "RDP exposed - potential brute force target")
                .on_ports(&[3389])
                .on_services(&["RDP"]),
            RiskRule::new(ExposedDatabase, "Database directly exposed to network")
                .on_ports(&[1433, 3306, 5432, 6379, 9200, 11211, 27017])
                .on_services(&[
                    "MSSQL",
                    "MySQL",
                    "PostgreSQL",
                    "Redis",
                    "Elasticsearch",
                    "Memcached",
                    "MongoDB",
                ]),
        ])
    }
}

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::PortSpecError;

/// Range scanned when the user does not ask for anything else.
pub const DEFAULT_PORT_SPEC: &str = "1-1000";

/// A non-empty, ascending set of distinct TCP ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    ports: Vec<u16>,
}

impl PortSpec {
    /// Parse `start-end`, a comma separated list (`22,80,443`), or a mix of both
    /// (`22,8000-8010`). Overlapping entries are deduplicated.
    pub fn parse(s: &str) -> Result<Self, PortSpecError> {
        let mut set = BTreeSet::new();
        collect_spec(s, &mut set)?;
        Self::from_set(set)
    }

    /// Inclusive range. Errors if `start > end`.
    pub fn from_range(start: u16, end: u16) -> Result<Self, PortSpecError> {
        if start > end {
            return Err(PortSpecError::ReversedRange { start, end });
        }
        Self::from_set((start..=end).collect())
    }

    pub fn from_ports<I: IntoIterator<Item = u16>>(ports: I) -> Result<Self, PortSpecError> {
        Self::from_set(ports.into_iter().collect())
    }

    fn from_set(set: BTreeSet<u16>) -> Result<Self, PortSpecError> {
        if set.is_empty() {
            return Err(PortSpecError::Empty);
        }
        Ok(Self {
            ports: set.into_iter().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Never true for a spec built through the constructors.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports.binary_search(&port).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports.iter().copied()
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.ports
    }
}

impl Default for PortSpec {
    fn default() -> Self {
        Self {
            ports: (1..=1000).collect(),
        }
    }
}

impl FromStr for PortSpec {
    type Err = PortSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PortSpec {
    /// Compact form: contiguous runs are collapsed into ranges.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut i = 0;
        while i < self.ports.len() {
            let start = self.ports[i];
            let mut j = i;
            while j + 1 < self.ports.len() && self.ports[j + 1] == self.ports[j] + 1 {
                j += 1;
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if j == i {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{}", self.ports[j])?;
            }
            i = j + 1;
        }
        Ok(())
    }
}

fn collect_spec(s: &str, out: &mut BTreeSet<u16>) -> Result<(), PortSpecError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(PortSpecError::Empty);
    }
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(PortSpecError::InvalidNumber(part.to_string()));
        }

        // Range `start-end`
        if let Some((a, b)) = part.split_once('-') {
            let start = parse_port_str(a.trim())?;
            let end = parse_port_str(b.trim())?;
            if start > end {
                return Err(PortSpecError::ReversedRange { start, end });
            }
            out.extend(start..=end);
            continue;
        }

        out.insert(parse_port_str(part)?);
    }
    Ok(())
}

fn parse_port_str(s: &str) -> Result<u16, PortSpecError> {
    let val: u32 = s
        .parse::<u32>()
        .map_err(|_| PortSpecError::InvalidNumber(s.to_string()))?;
    u16::try_from(val).map_err(|_| PortSpecError::OutOfRange(val))
}

/// Parse a ports file into one merged spec.
///
/// Each line holds any spec accepted by [`PortSpec::parse`]; everything after `#`
/// is ignored, as are blank lines.
pub fn parse_ports_str(s: &str) -> Result<PortSpec> {
    let mut set = BTreeSet::new();
    for (idx, raw_line) in s.lines().enumerate() {
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }
        collect_spec(line, &mut set).with_context(|| format!("line {}: {line}", idx + 1))?;
    }
    Ok(PortSpec::from_set(set)?)
}

/// Load a ports file. Errors if the file cannot be read, fails to parse, or lists no ports.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<PortSpec> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read ports file: {}", path.as_ref().display()))?;
    parse_ports_str(&content)
        .with_context(|| format!("invalid ports file: {}", path.as_ref().display()))
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use time::macros::format_description;
use time::{format_description::well_known, OffsetDateTime};

use crate::types::{ScanResult, StateCounts};

/// One open port as it appears in the JSON report.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OpenPort {
    pub port: u16,
    pub service: String,
    pub banner: String,
    pub version: Option<String>,
    pub latency_ms: Option<u64>,
}

/// User-facing report built from a finished (or partial) scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Report {
    pub target: String,
    pub address: String,
    pub scan_time: String,
    pub finished_at: String,
    pub duration_secs: f64,
    pub complete: bool,
    pub ports_total: u64,
    pub ports_scanned: u64,
    pub counts: StateCounts,
    pub total_open_ports: usize,
    pub open_ports: Vec<OpenPort>,
    pub vulnerabilities: Vec<String>,
}

impl Report {
    pub fn from_result(result: &ScanResult) -> Self {
        let open_ports: Vec<OpenPort> = result
            .outcomes
            .iter()
            .map(|o| OpenPort {
                port: o.port,
                service: o.service.clone().unwrap_or_default(),
                banner: o.banner.clone().unwrap_or_default(),
                version: o.version.clone(),
                latency_ms: o.latency.map(|d| d.as_millis() as u64),
            })
            .collect();
        Self {
            target: result.target.name.clone(),
            address: result.address().to_string(),
            scan_time: rfc3339(result.started_at),
            finished_at: rfc3339(result.finished_at),
            duration_secs: result.duration().as_secs_f64(),
            complete: result.complete,
            ports_total: result.ports_total,
            ports_scanned: result.ports_scanned(),
            counts: result.counts,
            total_open_ports: open_ports.len(),
            open_ports,
            vulnerabilities: result.findings.clone(),
        }
    }
}

/// Write `report` as pretty JSON.
pub fn write_report(path: &Path, report: &Report) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create report file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)
        .with_context(|| format!("failed to write report: {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// `scan_<target>_<YYYYmmdd_HHMMSS>.json`, with dots and colons in the target replaced.
pub fn default_report_filename(target: &str, at: OffsetDateTime) -> String {
    let stamp = at
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_else(|_| String::from("00000000_000000"));
    let target = target.replace(['.', ':'], "_");
    format!("scan_{target}_{stamp}.json")
}

/// Cut a banner to `max` characters for table output, appending `...` when cut.
pub fn truncate_banner(banner: &str, max: usize) -> String {
    let flat = banner.replace('\n', "\\n").replace('\r', "\\r");
    if flat.chars().count() > max {
        let cut: String = flat.chars().take(max).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

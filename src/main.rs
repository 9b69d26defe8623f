use std::path::PathBuf;
use std::time::Duration;

use portsweep::ports::{self, PortSpec, DEFAULT_PORT_SPEC};
use portsweep::probe::TcpProber;
use portsweep::report::{self, Report};
use portsweep::types::ScanResult;
use portsweep::{resolve_target, ScanConfig, Scanner};

use anyhow::{Context, Result};
use clap::Parser;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Widest banner snippet shown in the results table.
const BANNER_COLUMN: usize = 50;

/// portsweep — concurrent TCP connect scanner with service detection and basic risk advisories.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "portsweep",
    version,
    about = "Concurrent TCP connect scanner with service detection and basic risk advisories.",
    long_about = None
)]
struct Cli {
    /// Target IP address or hostname.
    target: String,

    /// Ports to scan: `start-end`, a comma separated list, or both (e.g. `22,80,8000-8100`).
    #[arg(short, long, default_value = DEFAULT_PORT_SPEC)]
    ports: String,

    /// Read ports from a file (one spec per line, `#` comments). Overrides --ports.
    #[arg(long = "ports-file")]
    ports_file: Option<PathBuf>,

    /// Connection timeout in seconds.
    #[arg(short, long, default_value_t = 1.0)]
    timeout: f64,

    /// Max concurrent TCP connect attempts.
    #[arg(short = 'T', long, default_value_t = 100)]
    threads: usize,

    /// Upper bound on the banner read in milliseconds (never longer than --timeout).
    #[arg(long = "banner-timeout-ms", default_value_t = 500)]
    banner_timeout_ms: u64,

    /// Stop the scan after this many seconds and report what was found so far.
    #[arg(long = "max-duration")]
    max_duration: Option<f64>,

    /// Write a JSON report named after the target and scan time.
    #[arg(short, long)]
    report: bool,

    /// Write the JSON report to this path (implies --report).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ports = match cli.ports_file.as_deref() {
        Some(path) => ports::load_ports_from_path(path)?,
        None => PortSpec::parse(&cli.ports)
            .with_context(|| format!("invalid port specification: {}", cli.ports))?,
    };
    let timeout = seconds(cli.timeout).context("--timeout must be a positive number")?;
    let target = resolve_target(&cli.target).await?;

    let mut config = ScanConfig::new(target, ports, timeout, cli.threads)?;
    if let Some(secs) = cli.max_duration {
        config = config
            .with_max_duration(seconds(secs).context("--max-duration must be a positive number")?);
    }

    println!("portsweep configuration:");
    println!("  target       : {}", config.target());
    println!("  ports        : {} ({} ports)", config.ports(), config.ports().len());
    println!("  concurrency  : {}", config.concurrency());
    println!("  timeout      : {:.2}s", config.timeout().as_secs_f64());
    println!(
        "  started      : {}",
        OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default()
    );

    // Ctrl-C cancels the scan; whatever finished is still reported.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let prober = TcpProber::new().with_banner_timeout(Duration::from_millis(cli.banner_timeout_ms));
    let scanner = Scanner::with_prober(prober);
    let result = scanner.run_with_cancel(&config, cancel).await;

    print_results_table(&result);
    print_findings(&result);

    if cli.report || cli.output.is_some() {
        let path = cli.output.clone().unwrap_or_else(|| {
            PathBuf::from(report::default_report_filename(
                &result.target.name,
                result.started_at,
            ))
        });
        let report = Report::from_result(&result);
        match report::write_report(&path, &report) {
            Ok(()) => println!("\nDetailed report saved to: {}", path.display()),
            Err(e) => eprintln!("Failed to write JSON to {}: {e:#}", path.display()),
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn seconds(secs: f64) -> Option<Duration> {
    (secs.is_finite() && secs > 0.0).then(|| Duration::from_secs_f64(secs))
}

fn print_results_table(result: &ScanResult) {
    let mut service_w = "service".len();
    for o in &result.outcomes {
        service_w = service_w.max(o.service.as_deref().map_or(0, str::len));
    }

    println!(
        "\n{:<9}  {:<6}  {:<service_w$}  banner",
        "port",
        "state",
        "service",
        service_w = service_w
    );
    println!(
        "{:-<9}  {:-<6}  {:-<service_w$}  {:-<6}",
        "",
        "",
        "",
        "",
        service_w = service_w
    );
    for o in &result.outcomes {
        let banner = o.banner.as_deref().unwrap_or_default();
        println!(
            "{:<9}  {:<6}  {:<service_w$}  {}",
            format!("{}/tcp", o.port),
            o.state,
            o.service.as_deref().unwrap_or_default(),
            report::truncate_banner(banner, BANNER_COLUMN),
            service_w = service_w
        );
    }

    let c = &result.counts;
    println!(
        "\nScan {} in {:.2} seconds: {} open, {} closed, {} filtered, {} error ({} of {} ports)",
        if result.complete { "completed" } else { "INTERRUPTED" },
        result.duration().as_secs_f64(),
        c.open,
        c.closed,
        c.filtered,
        c.error,
        result.ports_scanned(),
        result.ports_total
    );
    println!(
        "Found {} open ports on {}",
        result.outcomes.len(),
        result.target
    );
}

fn print_findings(result: &ScanResult) {
    if result.findings.is_empty() {
        return;
    }
    println!("\nSECURITY FINDINGS:");
    for finding in &result.findings {
        println!("  - {finding}");
    }
}

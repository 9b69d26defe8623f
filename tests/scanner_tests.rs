use async_trait::async_trait;
use portsweep::probe::Prober;
use portsweep::tables::{RiskCategory, RiskRule, RiskRules, ServiceTable};
use portsweep::{PortOutcome, PortSpec, PortState, ScanConfig, Scanner, Target};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Fake prober: sleeps, counts concurrent entries and per-port calls.
/// Ports divisible by 10 are open, odd ports refused, the rest time out.
#[derive(Default)]
struct CountingProber {
    delay: Duration,
    current: AtomicUsize,
    max_seen: AtomicUsize,
    calls: Mutex<HashMap<u16, usize>>,
}

impl CountingProber {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Prober for CountingProber {
    async fn probe(&self, _addr: IpAddr, port: u16, _timeout: Duration) -> PortOutcome {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        *self.calls.lock().unwrap().entry(port).or_default() += 1;

        tokio::time::sleep(self.delay).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        if port % 10 == 0 {
            PortOutcome::open(port, self.delay, String::new())
        } else if port % 2 == 1 {
            PortOutcome::closed(port, self.delay)
        } else {
            PortOutcome::filtered(port)
        }
    }
}

fn config(ports: &str, concurrency: usize) -> ScanConfig {
    ScanConfig::new(
        Target::from_addr(LOCALHOST),
        PortSpec::parse(ports).unwrap(),
        Duration::from_secs(1),
        concurrency,
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn every_port_probed_exactly_once() {
    let scanner = Scanner::with_prober(CountingProber::with_delay(Duration::from_millis(10)));
    let result = scanner.run(&config("1-500", 20)).await;

    assert!(result.complete);
    assert_eq!(result.ports_total, 500);
    assert_eq!(result.ports_scanned(), 500);
    assert_eq!(result.counts.open, 50);
    assert_eq!(result.counts.closed, 250);
    assert_eq!(result.counts.filtered, 200);

    let calls = scanner.prober().calls.lock().unwrap();
    assert_eq!(calls.len(), 500);
    assert!(calls.values().all(|&n| n == 1));
}

#[tokio::test(start_paused = true)]
async fn full_scan_returns_without_cancellation() {
    let scanner = Scanner::with_prober(CountingProber::with_delay(Duration::from_millis(50)));
    let cfg = config("1-5", 2);

    let result = tokio::time::timeout(Duration::from_secs(30), scanner.run(&cfg))
        .await
        .expect("run() must return once every port is probed");

    assert!(result.complete);
    assert_eq!(result.counts.total(), result.ports_total);
    assert_eq!(result.ports_total, 5);
}

#[tokio::test]
async fn full_loopback_scan_returns_promptly() {
    let port = {
        let l = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        l.local_addr().unwrap().port()
    };
    let ports = PortSpec::from_ports([port]).unwrap();
    let cfg = ScanConfig::new(Target::from_addr(LOCALHOST), ports, Duration::from_millis(500), 2)
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), Scanner::new().run(&cfg))
        .await
        .expect("run() must return once every port is probed");

    assert!(result.complete);
    assert_eq!(result.ports_scanned(), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_task_does_not_outlive_scan() {
    let scanner = Scanner::with_prober(CountingProber::with_delay(Duration::from_millis(10)));
    let cfg = config("1-20", 5).with_max_duration(Duration::from_secs(3600));

    let result = scanner.run(&cfg).await;
    assert!(result.complete);

    let metrics = tokio::runtime::Handle::current().metrics();
    for _ in 0..16 {
        if metrics.num_alive_tasks() == 0 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(metrics.num_alive_tasks(), 0);
}

#[tokio::test(start_paused = true)]
async fn in_flight_probes_never_exceed_concurrency() {
    let scanner = Scanner::with_prober(CountingProber::with_delay(Duration::from_millis(25)));
    let result = scanner.run(&config("1-1000", 17)).await;

    assert!(result.complete);
    let max = scanner.prober().max_seen.load(Ordering::SeqCst);
    assert!(max <= 17, "saw {max} concurrent probes");
    assert!(max > 1);
}

#[tokio::test(start_paused = true)]
async fn open_ports_sorted_and_classified() {
    let scanner = Scanner::with_prober(CountingProber::with_delay(Duration::from_millis(5)))
        .with_services(ServiceTable::from_entries([(20, "FTP-Data"), (80, "HTTP")]));
    let result = scanner.run(&config("80,20,95,30", 4)).await;

    let ports: Vec<u16> = result.outcomes.iter().map(|o| o.port).collect();
    assert_eq!(ports, vec![20, 30, 80]);
    assert!(result.outcomes.iter().all(|o| o.state == PortState::Open));
    assert_eq!(result.outcomes[0].service.as_deref(), Some("FTP-Data"));
    assert_eq!(result.outcomes[1].service.as_deref(), Some("Unknown"));
    assert_eq!(result.outcomes[2].service.as_deref(), Some("HTTP"));
    assert_eq!(
        result.findings,
        vec!["Port 80: HTTP serves content without transport encryption".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_returns_partial_result() {
    let scanner = Scanner::with_prober(CountingProber::with_delay(Duration::from_millis(100)));
    let cfg = config("1-10000", 50);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let result = scanner.run_with_cancel(&cfg, cancel).await;

    assert!(!result.complete);
    assert!(result.is_partial());
    // About ten rounds of 50 probes finish within the first second.
    assert!(result.ports_scanned() >= 400, "scanned {}", result.ports_scanned());
    assert!(result.ports_scanned() < result.ports_total);
    assert_eq!(result.counts.open as usize, result.outcomes.len());
    assert!(result.outcomes.windows(2).all(|w| w[0].port < w[1].port));
}

#[tokio::test(start_paused = true)]
async fn deadline_stops_scan_without_cancelling_caller() {
    let scanner = Scanner::with_prober(CountingProber::with_delay(Duration::from_millis(100)));
    let cfg = config("1-10000", 50).with_max_duration(Duration::from_millis(500));
    let cancel = CancellationToken::new();

    let result = scanner.run_with_cancel(&cfg, cancel.clone()).await;

    assert!(!result.complete);
    assert!(result.ports_scanned() > 0);
    assert!(!cancel.is_cancelled());
}

#[tokio::test]
async fn end_to_end_against_loopback() {
    // One listener announcing an SSH banner, one port that refuses.
    let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let ssh_port = listener.local_addr().unwrap().port();
    let closed_port = {
        let l = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        l.local_addr().unwrap().port()
    };
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let _ = sock.write_all(b"SSH-2.0-OpenSSH_8.9\r\n").await;
                tokio::time::sleep(Duration::from_millis(500)).await;
            });
        }
    });

    let ports = PortSpec::from_ports([ssh_port, closed_port]).unwrap();
    let cfg = ScanConfig::new(Target::from_addr(LOCALHOST), ports, Duration::from_secs(1), 20)
        .unwrap();
    let rules = RiskRules::new(vec![RiskRule::new(
        RiskCategory::RemoteAccess,
        "SSH exposed - restrict access",
    )
    .on_services(&["SSH"])]);
    let scanner = Scanner::new()
        .with_services(ServiceTable::from_entries([(ssh_port, "SSH")]))
        .with_rules(rules);

    let result = tokio::time::timeout(Duration::from_secs(10), scanner.run(&cfg))
        .await
        .expect("scan finished");

    assert!(result.complete);
    assert_eq!(result.ports_scanned(), 2);
    assert_eq!(result.outcomes.len(), 1);
    let open = &result.outcomes[0];
    assert_eq!(open.port, ssh_port);
    assert_eq!(open.state, PortState::Open);
    assert_eq!(open.service.as_deref(), Some("SSH"));
    assert_eq!(open.banner.as_deref(), Some("SSH-2.0-OpenSSH_8.9"));
    assert_eq!(open.version.as_deref(), Some("OpenSSH_8.9"));
    assert_eq!(result.counts.closed, 1);
    assert_eq!(result.findings.len(), 1);
    assert!(result.findings[0].contains("SSH"));
}

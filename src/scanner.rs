use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assess::assess;
use crate::classify::classify;
use crate::error::ScanError;
use crate::ports::PortSpec;
use crate::probe::{Prober, TcpProber};
use crate::tables::{RiskRules, ServiceTable};
use crate::target::Target;
use crate::types::{PortOutcome, ScanResult, StateCounts};

/// Immutable parameters of one scan.
#[derive(Debug, Clone)]
///
/// Fields are only reachable through accessors so every config has passed the
/// checks in [`ScanConfig::new`].
pub struct ScanConfig {
    target: Target,
    ports: PortSpec,
    timeout: Duration,
    concurrency: usize,
    max_duration: Option<Duration>,
}

impl ScanConfig {
    pub fn new(
        target: Target,
        ports: PortSpec,
        timeout: Duration,
        concurrency: usize,
    ) -> Result<Self, ScanError> {
        if timeout.is_zero() {
            return Err(ScanError::InvalidConfig("timeout must be positive".into()));
        }
        if concurrency == 0 {
            return Err(ScanError::InvalidConfig(
                "concurrency must be at least 1".into(),
            ));
        }
        Ok(Self {
            target,
            ports,
            timeout,
            concurrency,
            max_duration: None,
        })
    }

    pub fn with_max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn ports(&self) -> &PortSpec {
        &self.ports
    }

    /// Per-operation bound for connect and banner read.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Maximum number of probes in flight.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Optional scan-level deadline. When it passes the scan stops early.
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration
    }

    /// Worst case wall time when every probe runs into its timeout.
    pub fn worst_case_duration(&self) -> Duration {
        let batches = self.ports.len().div_ceil(self.concurrency) as u32;
        self.timeout.saturating_mul(batches)
    }
}

/// Scan engine: a bounded pool of probes plus the classify/assess pass.
///
/// Outcomes flow back through the `JoinSet` to the single collecting loop in
/// [`Scanner::run_with_cancel`]; probe tasks never touch the result directly.
pub struct Scanner<P = TcpProber> {
    prober: Arc<P>,
    services: ServiceTable,
    rules: RiskRules,
}

impl Scanner<TcpProber> {
    pub fn new() -> Self {
        Self::with_prober(TcpProber::new())
    }
}

impl Default for Scanner<TcpProber> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Prober + 'static> Scanner<P> {
    pub fn with_prober(prober: P) -> Self {
        Self {
            prober: Arc::new(prober),
            services: ServiceTable::default(),
            rules: RiskRules::default(),
        }
    }

    pub fn with_services(mut self, services: ServiceTable) -> Self {
        self.services = services;
        self
    }

    pub fn with_rules(mut self, rules: RiskRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    /// Scan every port in `config`. Stops early only if `config.max_duration` passes.
    pub async fn run(&self, config: &ScanConfig) -> ScanResult {
        self.run_with_cancel(config, CancellationToken::new()).await
    }

    /// Variant that accepts a `CancellationToken` to allow external cancellation.
    ///
    /// On cancellation no new probes are dispatched, in-flight probes are aborted and
    /// the outcomes gathered so far are returned with `complete == false`.
    pub async fn run_with_cancel(
        &self,
        config: &ScanConfig,
        cancel: CancellationToken,
    ) -> ScanResult {
        let started_at = OffsetDateTime::now_utc();
        let addr = config.target.addr;
        let timeout = config.timeout;
        info!(
            target = %config.target,
            ports = config.ports.len(),
            concurrency = config.concurrency,
            timeout_ms = timeout.as_millis() as u64,
            "scan started"
        );

        // Child token so the deadline never cancels the caller's token.
        let cancel = cancel.child_token();
        // Cancelling the child on return also retires the deadline task below.
        let _deadline_guard = cancel.clone().drop_guard();
        if let Some(limit) = config.max_duration {
            let deadline = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        debug!(limit_ms = limit.as_millis() as u64, "scan deadline reached");
                        deadline.cancel();
                    }
                    _ = deadline.cancelled() => {}
                }
            });
        }

        let sem = Arc::new(Semaphore::new(config.concurrency));
        let mut set: JoinSet<PortOutcome> = JoinSet::new();
        let mut in_flight: HashMap<task::Id, u16> = HashMap::new();
        let mut pending = config.ports.iter().peekable();
        let mut collected: Vec<PortOutcome> = Vec::with_capacity(config.ports.len());
        let mut counts = StateCounts::default();
        let mut interrupted = false;

        loop {
            if pending.peek().is_none() && set.is_empty() {
                break;
            }
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    interrupted = true;
                    break;
                }

                Some(joined) = set.join_next_with_id(), if !set.is_empty() => {
                    if let Some(outcome) = settle(joined, &mut in_flight) {
                        record(outcome, &mut collected, &mut counts);
                    }
                }

                Ok(permit) = sem.clone().acquire_owned(), if pending.peek().is_some() => {
                    let Some(port) = pending.next() else { continue };
                    let prober = Arc::clone(&self.prober);
                    let handle = set.spawn(async move {
                        let _permit = permit; // keep permit until the probe completes
                        prober.probe(addr, port, timeout).await
                    });
                    in_flight.insert(handle.id(), port);
                }
            }
        }

        if interrupted {
            warn!(
                in_flight = set.len(),
                not_started = pending.count(),
                "scan cancelled; returning partial result"
            );
            set.abort_all();
            // Keep probes that finished before the abort landed.
            while let Some(joined) = set.join_next_with_id().await {
                match joined {
                    Ok((_, outcome)) => record(outcome, &mut collected, &mut counts),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => {
                        if let Some(outcome) = settle(Err(e), &mut in_flight) {
                            record(outcome, &mut collected, &mut counts);
                        }
                    }
                }
            }
        }

        let mut outcomes: Vec<PortOutcome> = collected
            .iter()
            .filter(|o| o.state.is_open())
            .map(|o| classify(o, &self.services))
            .collect();
        outcomes.sort_by_key(|o| o.port);
        let findings = assess(&outcomes, &self.rules);

        let result = ScanResult {
            target: config.target.clone(),
            started_at,
            finished_at: OffsetDateTime::now_utc(),
            outcomes,
            counts,
            ports_total: config.ports.len() as u64,
            complete: !interrupted,
            findings,
        };
        info!(
            open = counts.open,
            closed = counts.closed,
            filtered = counts.filtered,
            error = counts.error,
            complete = result.complete,
            elapsed_ms = result.duration().as_millis() as u64,
            "scan finished"
        );
        result
    }
}

/// Turn a joined probe task into an outcome. A panicked probe still accounts for
/// its port as an error; a failed task with no recorded port yields nothing.
fn settle(
    joined: Result<(task::Id, PortOutcome), JoinError>,
    in_flight: &mut HashMap<task::Id, u16>,
) -> Option<PortOutcome> {
    match joined {
        Ok((id, outcome)) => {
            in_flight.remove(&id);
            Some(outcome)
        }
        Err(e) => match in_flight.remove(&e.id()) {
            Some(port) => {
                warn!(port, error = %e, "probe task failed");
                Some(PortOutcome::error(port))
            }
            None => {
                warn!(error = %e, "probe task failed with no port on record");
                None
            }
        },
    }
}

fn record(outcome: PortOutcome, collected: &mut Vec<PortOutcome>, counts: &mut StateCounts) {
    counts.record(outcome.state);
    if outcome.state.is_open() {
        debug!(
            port = outcome.port,
            latency_ms = outcome.latency.map(|d| d.as_millis() as u64),
            banner_len = outcome.banner.as_ref().map(String::len),
            "open port"
        );
    }
    collected.push(outcome);
}

pub mod classifier;
pub mod demux;
pub mod probe;
mod results;
mod target;

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::transport::{PacketTransport, TransportError, TransportFactory};
use classifier::classify;
use demux::Demultiplexer;
use probe::{Probe, ProbePolicy};
pub use probe::ProbeOutcome;
pub use results::{PortResult, PortVerdict, ScanResult};
pub use target::Target;

/// Scan-wide knobs, passed explicitly into every scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    pub per_attempt_timeout: Duration,
    pub retry_count: u32,
    pub max_concurrency: usize,
    /// Hard stop for the whole scan; ports still pending become `Filtered`.
    pub overall_deadline: Option<Duration>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            per_attempt_timeout: Duration::from_millis(1000),
            retry_count: 1,
            max_concurrency: 16,
            overall_deadline: None,
        }
    }
}

impl ScanOptions {
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.per_attempt_timeout.is_zero() {
            return Err(ScanError::InvalidOptions(
                "per-attempt timeout must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ScanError::InvalidOptions(
                "max concurrency must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrency > Semaphore::MAX_PERMITS {
            return Err(ScanError::InvalidOptions(format!(
                "max concurrency must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.overall_deadline.is_some_and(|d| d.is_zero()) {
            return Err(ScanError::InvalidOptions(
                "overall deadline must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn probe_policy(&self) -> ProbePolicy {
        ProbePolicy {
            per_attempt_timeout: self.per_attempt_timeout,
            retry_count: self.retry_count,
        }
    }
}

/// Half-open scan orchestrator: one probe task per port, at most
/// `max_concurrency` in flight, results in request order.
pub struct Scanner {
    options: ScanOptions,
    show_progress: bool,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Scan `ports` on `target`.
    ///
    /// Fails only when the scan cannot start: bad options, port 0, or a
    /// transport that cannot be opened. Once probes are out, every port gets
    /// exactly one verdict, even when the deadline cuts the scan short.
    pub async fn scan<F>(&self, factory: &F, target: &Target, ports: &[u16]) -> Result<ScanResult, ScanError>
    where
        F: TransportFactory,
    {
        self.options.validate()?;
        if ports.contains(&0) {
            return Err(ScanError::InvalidPort(0));
        }

        let start_time = chrono::Utc::now();
        if ports.is_empty() {
            return Ok(ScanResult {
                target: target.host.clone(),
                target_ip: target.ip,
                start_time,
                end_time: start_time,
                ports: Vec::new(),
            });
        }

        let transport = Arc::new(factory.open(target.ip)?);
        let started = Instant::now();
        // A deadline past the end of the clock means no deadline.
        let deadline = self.options.overall_deadline.and_then(|d| started.checked_add(d));

        info!(
            host = %target,
            ports = ports.len(),
            concurrency = self.options.max_concurrency,
            timeout_ms = self.options.per_attempt_timeout.as_millis() as u64,
            retries = self.options.retry_count,
            "starting SYN scan"
        );

        let demux = Demultiplexer::new();
        let pump = spawn_receive_pump(transport.clone(), demux.clone());
        let pb = self.progress_bar(ports.len());

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency));
        let policy = self.options.probe_policy();
        let mut tasks = JoinSet::new();

        for (slot, &port) in ports.iter().enumerate() {
            let semaphore = semaphore.clone();
            let transport = transport.clone();
            let demux = demux.clone();
            let pb = pb.clone();
            let probe = Probe::new(target.ip, port, policy);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (slot, PortResult::filtered(port, 0));
                };

                let outcome = probe.run(transport.as_ref(), &demux).await;
                let verdict = classify(&outcome);
                debug!(port, %verdict, attempts = outcome.attempts(), "port classified");
                pb.inc(1);

                let result = PortResult {
                    port,
                    verdict,
                    flags: outcome.flags(),
                    rtt_ms: outcome.rtt().map(|rtt| rtt.as_secs_f64() * 1000.0),
                    attempts: outcome.attempts(),
                };
                (slot, result)
            });
        }

        let mut slots: Vec<Option<PortResult>> = vec![None; ports.len()];
        loop {
            let next = match deadline {
                Some(deadline) => {
                    let joined = timeout_at(deadline, tasks.join_next()).await;
                    match joined {
                        Ok(next) => next,
                        Err(_) => {
                            warn!(pending = tasks.len(), "scan deadline reached, marking pending ports filtered");
                            break;
                        }
                    }
                }
                None => tasks.join_next().await,
            };

            match next {
                Some(Ok((slot, result))) => slots[slot] = Some(result),
                Some(Err(e)) => warn!(error = %e, "probe task failed"),
                None => break,
            }
        }

        tasks.abort_all();
        pump.abort();
        pb.finish_and_clear();

        let results: Vec<PortResult> = slots
            .into_iter()
            .zip(ports)
            .map(|(slot, &port)| slot.unwrap_or_else(|| PortResult::filtered(port, 0)))
            .collect();

        let result = ScanResult {
            target: target.host.clone(),
            target_ip: target.ip,
            start_time,
            end_time: chrono::Utc::now(),
            ports: results,
        };

        info!(
            host = %target,
            open = result.count(PortVerdict::Open),
            closed = result.count(PortVerdict::Closed),
            filtered = result.count(PortVerdict::Filtered),
            peak_in_flight = demux.peak_outstanding(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "SYN scan complete"
        );

        Ok(result)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.green/black} {pos}/{len} ports probed ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        pb.set_style(style);
        pb
    }
}

/// Feed every inbound segment to the correlation table until the transport closes.
fn spawn_receive_pump<T>(transport: Arc<T>, demux: Arc<Demultiplexer>) -> JoinHandle<()>
where
    T: PacketTransport + 'static,
{
    tokio::spawn(async move {
        loop {
            match transport.recv().await {
                Ok(segment) => {
                    demux.dispatch(segment);
                }
                Err(TransportError::Closed) => {
                    debug!("transport closed, receive pump stopping");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "receive failed, receive pump stopping");
                    break;
                }
            }
        }
    })
}

use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::timeout;
use tracing::{trace, warn};

use super::demux::{Demultiplexer, ProbeKey, Registration};
use crate::transport::{PacketTransport, ResponseFlags, Segment};

/// Linux default ephemeral range; source ports are drawn from it per attempt.
pub const SOURCE_PORTS: RangeInclusive<u16> = 32_768..=60_999;

const MAX_PORT_DRAWS: usize = 16;

/// Raw result of one probe's full send/await/retry cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeOutcome {
    Response {
        flags: ResponseFlags,
        rtt: Duration,
        attempts: u32,
    },
    NoResponse {
        attempts: u32,
    },
}

impl ProbeOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            ProbeOutcome::Response { attempts, .. } | ProbeOutcome::NoResponse { attempts } => *attempts,
        }
    }

    pub fn flags(&self) -> Option<ResponseFlags> {
        match self {
            ProbeOutcome::Response { flags, .. } => Some(*flags),
            ProbeOutcome::NoResponse { .. } => None,
        }
    }

    pub fn rtt(&self) -> Option<Duration> {
        match self {
            ProbeOutcome::Response { rtt, .. } => Some(*rtt),
            ProbeOutcome::NoResponse { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProbePolicy {
    pub per_attempt_timeout: Duration,
    /// Additional attempts after the first one goes unanswered.
    pub retry_count: u32,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            per_attempt_timeout: Duration::from_millis(1000),
            retry_count: 1,
        }
    }
}

/// A half-open probe of one port. Sends only SYNs; a SYN-ACK is never
/// acknowledged.
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    target: Ipv4Addr,
    port: u16,
    policy: ProbePolicy,
}

impl Probe {
    pub fn new(target: Ipv4Addr, port: u16, policy: ProbePolicy) -> Self {
        Self { target, port, policy }
    }

    pub async fn run<T>(&self, transport: &T, demux: &Arc<Demultiplexer>) -> ProbeOutcome
    where
        T: PacketTransport + ?Sized,
    {
        let total = self.policy.retry_count.saturating_add(1);

        for attempt in 1..=total {
            let Some((mut registration, isn)) = self.claim(demux) else {
                warn!(port = self.port, "no free source port for attempt");
                continue;
            };
            let key = registration.key();
            let segment = Segment::syn(transport.local_ip(), self.target, key.src_port, self.port, isn);

            let sent_at = Instant::now();
            if let Err(e) = transport.send(&segment).await {
                warn!(port = self.port, attempt, error = %e, "SYN send failed");
                continue;
            }
            trace!(port = self.port, src_port = key.src_port, attempt, "SYN sent");

            match timeout(self.policy.per_attempt_timeout, registration.reply()).await {
                Ok(Some(reply)) => {
                    return ProbeOutcome::Response {
                        flags: reply.flags,
                        rtt: sent_at.elapsed(),
                        attempts: attempt,
                    };
                }
                Ok(None) | Err(_) => {
                    trace!(port = self.port, attempt, "no reply within attempt timeout");
                }
            }
        }

        ProbeOutcome::NoResponse { attempts: total }
    }

    /// Register a fresh (source port, sequence number) pair for one attempt.
    fn claim(&self, demux: &Arc<Demultiplexer>) -> Option<(Registration, u32)> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_PORT_DRAWS {
            let key = ProbeKey {
                target: self.target,
                port: self.port,
                src_port: rng.gen_range(SOURCE_PORTS),
            };
            let isn: u32 = rng.gen();
            if let Some(registration) = demux.register(key, isn) {
                return Some((registration, isn));
            }
        }
        None
    }
}

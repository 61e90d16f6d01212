//! Correlation table routing inbound segments to the probe that caused them.
//!
//! Every in-flight attempt registers `(target ip, target port, source port)`
//! together with its initial sequence number. The receive pump hands each
//! inbound segment to [`Demultiplexer::dispatch`], which wakes the matching
//! probe or drops the segment. The table is the only mutable state shared
//! between probe tasks; the lock is never held across an await.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::trace;

use crate::transport::Segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeKey {
    pub target: Ipv4Addr,
    pub port: u16,
    pub src_port: u16,
}

impl ProbeKey {
    /// Key an inbound segment would match: its source is the probed port,
    /// its destination is our source port.
    pub fn for_reply(segment: &Segment) -> Self {
        Self {
            target: segment.src_ip,
            port: segment.src_port,
            src_port: segment.dst_port,
        }
    }
}

struct PendingProbe {
    token: u64,
    isn: u32,
    reply: oneshot::Sender<Segment>,
}

#[derive(Default)]
pub struct Demultiplexer {
    table: Mutex<HashMap<ProbeKey, PendingProbe>>,
    next_token: AtomicU64,
    peak: AtomicUsize,
}

impl Demultiplexer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn table(&self) -> MutexGuard<'_, HashMap<ProbeKey, PendingProbe>> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `key` for one attempt. Returns `None` if another attempt already
    /// owns it; the caller should draw a different source port.
    pub fn register(self: &Arc<Self>, key: ProbeKey, isn: u32) -> Option<Registration> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let mut table = self.table();
        if table.contains_key(&key) {
            return None;
        }
        table.insert(key, PendingProbe { token, isn, reply: tx });
        self.peak.fetch_max(table.len(), Ordering::Relaxed);
        drop(table);

        Some(Registration {
            demux: Arc::clone(self),
            key,
            token,
            rx,
        })
    }

    /// Route an inbound segment. Returns `true` if a waiting probe took it.
    ///
    /// A segment carrying ACK must acknowledge exactly `isn + 1`; anything else
    /// is a stale or foreign reply and is discarded.
    pub fn dispatch(&self, segment: Segment) -> bool {
        let key = ProbeKey::for_reply(&segment);

        let pending = {
            let mut table = self.table();
            let expected_ack = match table.get(&key) {
                Some(entry) => entry.isn.wrapping_add(1),
                None => {
                    trace!(port = key.port, src_port = key.src_port, flags = %segment.flags, "unmatched segment");
                    return false;
                }
            };
            if segment.flags.ack() && segment.ack != expected_ack {
                trace!(port = key.port, expected = expected_ack, got = segment.ack, "acknowledgment mismatch, discarding");
                return false;
            }
            table.remove(&key)
        };

        match pending {
            Some(entry) => entry.reply.send(segment).is_ok(),
            None => false,
        }
    }

    fn release(&self, key: &ProbeKey, token: u64) {
        let mut table = self.table();
        if table.get(key).is_some_and(|entry| entry.token == token) {
            table.remove(key);
        }
    }

    /// Attempts currently waiting for a reply.
    pub fn outstanding(&self) -> usize {
        self.table().len()
    }

    /// Highest number of simultaneously outstanding attempts seen so far.
    pub fn peak_outstanding(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }
}

/// One attempt's claim on the table. Dropping it releases the entry, so an
/// aborted or timed-out probe never leaves anything behind.
pub struct Registration {
    demux: Arc<Demultiplexer>,
    key: ProbeKey,
    token: u64,
    rx: oneshot::Receiver<Segment>,
}

impl Registration {
    pub fn key(&self) -> ProbeKey {
        self.key
    }

    /// Wait for the correlated reply. `None` if the entry was dropped unanswered.
    pub async fn reply(&mut self) -> Option<Segment> {
        (&mut self.rx).await.ok()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.demux.release(&self.key, self.token);
    }
}

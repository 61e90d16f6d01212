//! In-memory transport that answers SYNs from a per-port script.

use std::collections::HashMap;
use std::io;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{PacketTransport, ResponseFlags, Segment, TransportError, TransportFactory};

#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// Answer every attempt with these flags.
    Flags(ResponseFlags),
    /// Never answer.
    Silent,
    /// Stay silent until the given attempt (1-based), then answer.
    OnAttempt(usize, ResponseFlags),
    /// Answer after a delay.
    Delayed(Duration, ResponseFlags),
    /// Answer with an acknowledgment number that matches no probe.
    WrongAck(ResponseFlags),
    /// Fail every send to this port.
    SendError,
    /// Panic inside `send`, taking the calling task down.
    Panic,
}

#[derive(Debug, Default)]
struct Counters {
    sends: HashMap<u16, usize>,
    sent: Vec<Segment>,
    /// Delayed replies sent but not yet delivered.
    in_flight: usize,
    peak_in_flight: usize,
}

#[derive(Clone)]
pub struct ScriptedFactory {
    replies: Arc<HashMap<u16, Reply>>,
    counters: Arc<Mutex<Counters>>,
    deny: bool,
}

impl ScriptedFactory {
    pub fn new(replies: impl IntoIterator<Item = (u16, Reply)>) -> Self {
        Self {
            replies: Arc::new(replies.into_iter().collect()),
            counters: Arc::new(Mutex::new(Counters::default())),
            deny: false,
        }
    }

    /// A factory that fails as an unprivileged process would.
    pub fn denied() -> Self {
        Self {
            deny: true,
            ..Self::new([])
        }
    }

    pub fn sends_to(&self, port: u16) -> usize {
        self.counters.lock().unwrap().sends.get(&port).copied().unwrap_or(0)
    }

    /// Every segment handed to a transport for `port`, in send order.
    pub fn segments_to(&self, port: u16) -> Vec<Segment> {
        self.counters
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|segment| segment.dst_port == port)
            .copied()
            .collect()
    }

    pub fn total_sends(&self) -> usize {
        self.counters.lock().unwrap().sends.values().sum()
    }

    /// Most delayed replies that were pending at once.
    pub fn peak_in_flight(&self) -> usize {
        self.counters.lock().unwrap().peak_in_flight
    }
}

impl TransportFactory for ScriptedFactory {
    type Transport = ScriptedTransport;

    fn open(&self, _target: Ipv4Addr) -> Result<ScriptedTransport, TransportError> {
        if self.deny {
            return Err(TransportError::PermissionDenied);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(ScriptedTransport {
            replies: self.replies.clone(),
            counters: self.counters.clone(),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        })
    }
}

pub struct ScriptedTransport {
    replies: Arc<HashMap<u16, Reply>>,
    counters: Arc<Mutex<Counters>>,
    tx: mpsc::UnboundedSender<Segment>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Segment>>,
}

impl ScriptedTransport {
    fn answer(probe: &Segment, flags: ResponseFlags, ack: u32) -> Segment {
        Segment {
            src_ip: probe.dst_ip,
            dst_ip: probe.src_ip,
            src_port: probe.dst_port,
            dst_port: probe.src_port,
            seq: 1_000,
            ack,
            flags,
        }
    }
}

#[async_trait]
impl PacketTransport for ScriptedTransport {
    fn local_ip(&self) -> Ipv4Addr {
        Ipv4Addr::new(192, 0, 2, 1)
    }

    async fn send(&self, segment: &Segment) -> Result<(), TransportError> {
        let attempt = {
            let mut counters = self.counters.lock().unwrap();
            counters.sent.push(*segment);
            let count = counters.sends.entry(segment.dst_port).or_insert(0);
            *count += 1;
            *count
        };

        let expected_ack = segment.seq.wrapping_add(1);
        let reply = self.replies.get(&segment.dst_port).copied().unwrap_or(Reply::Silent);
        match reply {
            Reply::Flags(flags) => {
                let _ = self.tx.send(Self::answer(segment, flags, expected_ack));
            }
            Reply::OnAttempt(from, flags) if attempt >= from => {
                let _ = self.tx.send(Self::answer(segment, flags, expected_ack));
            }
            Reply::Delayed(delay, flags) => {
                {
                    let mut counters = self.counters.lock().unwrap();
                    counters.in_flight += 1;
                    counters.peak_in_flight = counters.peak_in_flight.max(counters.in_flight);
                }
                let tx = self.tx.clone();
                let counters = self.counters.clone();
                let answer = Self::answer(segment, flags, expected_ack);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    counters.lock().unwrap().in_flight -= 1;
                    let _ = tx.send(answer);
                });
            }
            Reply::WrongAck(flags) => {
                let _ = self.tx.send(Self::answer(segment, flags, expected_ack.wrapping_add(77)));
            }
            Reply::SendError => {
                return Err(TransportError::Send(io::Error::new(
                    io::ErrorKind::Other,
                    "scripted send failure",
                )));
            }
            Reply::Panic => panic!("scripted send panic on port {}", segment.dst_port),
            Reply::OnAttempt(..) | Reply::Silent => {}
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Segment, TransportError> {
        self.rx.lock().await.recv().await.ok_or(TransportError::Closed)
    }
}

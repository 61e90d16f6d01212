//! Raw IPv4/TCP transport backed by a `pnet` layer-4 channel.
//!
//! The kernel writes the IPv4 header; we hand it a bare TCP header. Inbound
//! segments are read on a dedicated blocking thread and forwarded to the async
//! side over an unbounded channel, so the receive pump never blocks the runtime.

use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::tcp::TcpPacket;
use pnet::transport::{
    tcp_packet_iter, transport_channel, TransportChannelType::Layer4, TransportProtocol::Ipv4,
    TransportReceiver, TransportSender,
};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::packet::{build_tcp_header, parse_segment};
use super::{PacketTransport, Segment, TransportError, TransportFactory};

const CHANNEL_BUFFER: usize = 4096;
const READ_POLL: Duration = Duration::from_millis(100);

/// Opens [`RawTransport`]s. Requires root or `CAP_NET_RAW`.
#[derive(Debug, Clone, Default)]
pub struct RawTransportFactory {
    source_ip: Option<Ipv4Addr>,
}

impl RawTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the source address instead of asking the routing table.
    pub fn with_source_ip(mut self, source_ip: Ipv4Addr) -> Self {
        self.source_ip = Some(source_ip);
        self
    }
}

impl TransportFactory for RawTransportFactory {
    type Transport = RawTransport;

    fn open(&self, target: Ipv4Addr) -> Result<RawTransport, TransportError> {
        let local_ip = match self.source_ip {
            Some(ip) => ip,
            None => detect_source_ip(target)?,
        };
        RawTransport::open(target, local_ip)
    }
}

pub struct RawTransport {
    target: Ipv4Addr,
    local_ip: Ipv4Addr,
    sender: Mutex<TransportSender>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Segment>>,
    shutdown: Arc<AtomicBool>,
}

impl RawTransport {
    pub fn open(target: Ipv4Addr, local_ip: Ipv4Addr) -> Result<Self, TransportError> {
        let (tx, rx) = transport_channel(CHANNEL_BUFFER, Layer4(Ipv4(IpNextHeaderProtocols::Tcp)))
            .map_err(TransportError::from_open)?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));

        let reader_shutdown = shutdown.clone();
        thread::Builder::new()
            .name("synscan-rx".to_string())
            .spawn(move || read_loop(rx, target, local_ip, inbound_tx, reader_shutdown))
            .map_err(TransportError::Unavailable)?;

        debug!(target_ip = %target, %local_ip, "raw TCP transport open");

        Ok(Self {
            target,
            local_ip,
            sender: Mutex::new(tx),
            inbound: tokio::sync::Mutex::new(inbound_rx),
            shutdown,
        })
    }
}

#[async_trait]
impl PacketTransport for RawTransport {
    fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    async fn send(&self, segment: &Segment) -> Result<(), TransportError> {
        let header = build_tcp_header(segment);
        let packet = TcpPacket::new(&header)
            .ok_or_else(|| TransportError::Send(io::Error::new(io::ErrorKind::InvalidData, "short TCP header")))?;

        // Blocking raw write under a std mutex; never held across an await.
        let mut sender = self
            .sender
            .lock()
            .map_err(|_| TransportError::Send(io::Error::new(io::ErrorKind::Other, "sender lock poisoned")))?;
        sender
            .send_to(packet, IpAddr::V4(segment.dst_ip))
            .map_err(TransportError::Send)?;
        Ok(())
    }

    async fn recv(&self) -> Result<Segment, TransportError> {
        self.inbound.lock().await.recv().await.ok_or(TransportError::Closed)
    }
}

impl Drop for RawTransport {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        trace!(target_ip = %self.target, "raw TCP transport closing");
    }
}

fn read_loop(
    mut rx: TransportReceiver,
    target: Ipv4Addr,
    local_ip: Ipv4Addr,
    inbound: mpsc::UnboundedSender<Segment>,
    shutdown: Arc<AtomicBool>,
) {
    let mut iter = tcp_packet_iter(&mut rx);
    while !shutdown.load(Ordering::Relaxed) {
        match iter.next_with_timeout(READ_POLL) {
            Ok(Some((tcp, IpAddr::V4(src)))) if src == target => {
                let Some(segment) = parse_segment(&tcp, src, local_ip) else {
                    trace!(src_ip = %src, "dropping malformed TCP header");
                    continue;
                };
                if inbound.send(segment).is_err() {
                    break;
                }
            }
            Ok(Some(_)) | Ok(None) => continue,
            Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => continue,
            Err(e) => {
                warn!(error = %e, "raw socket read failed, stopping receiver");
                break;
            }
        }
    }
    trace!("raw receiver thread exiting");
}

/// Find the address the routing table would use to reach `target` by
/// connecting an unbound UDP socket. No packet is sent.
pub fn detect_source_ip(target: Ipv4Addr) -> Result<Ipv4Addr, TransportError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(TransportError::Unavailable)?;
    socket.connect((target, 80)).map_err(TransportError::Unavailable)?;
    match socket.local_addr().map_err(TransportError::Unavailable)?.ip() {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(ip) => Err(TransportError::UnsupportedAddress(ip.to_string())),
    }
}

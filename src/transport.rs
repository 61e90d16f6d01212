pub mod packet;
pub mod raw;
#[cfg(test)]
pub(crate) mod scripted;

use std::fmt;
use std::io;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use pnet::packet::tcp::TcpFlags;
use serde::Serialize;

pub use raw::{RawTransport, RawTransportFactory};

/// TCP control bits carried by a segment, as the raw flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "String")]
pub struct ResponseFlags(pub u8);

impl ResponseFlags {
    pub const SYN_ACK: ResponseFlags = ResponseFlags(TcpFlags::SYN | TcpFlags::ACK);
    pub const RST: ResponseFlags = ResponseFlags(TcpFlags::RST);
    pub const RST_ACK: ResponseFlags = ResponseFlags(TcpFlags::RST | TcpFlags::ACK);

    pub fn syn(self) -> bool {
        self.0 & TcpFlags::SYN != 0
    }

    pub fn ack(self) -> bool {
        self.0 & TcpFlags::ACK != 0
    }

    pub fn rst(self) -> bool {
        self.0 & TcpFlags::RST != 0
    }
}

impl fmt::Display for ResponseFlags {
    /// Short notation, one letter per bit (`SA`, `RA`, `FPU`...).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const LETTERS: [(u8, char); 8] = [
            (TcpFlags::FIN, 'F'),
            (TcpFlags::SYN, 'S'),
            (TcpFlags::RST, 'R'),
            (TcpFlags::PSH, 'P'),
            (TcpFlags::ACK, 'A'),
            (TcpFlags::URG, 'U'),
            (TcpFlags::ECE, 'E'),
            (TcpFlags::CWR, 'C'),
        ];

        if self.0 == 0 {
            return write!(f, "none");
        }
        for (bit, letter) in LETTERS {
            if self.0 & bit != 0 {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

impl From<ResponseFlags> for String {
    fn from(flags: ResponseFlags) -> Self {
        flags.to_string()
    }
}

/// The TCP header fields the scanner cares about, with the IPv4 addressing
/// that carried them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: ResponseFlags,
}

impl Segment {
    /// A bare SYN with no acknowledgment, the only segment a probe ever sends.
    pub fn syn(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, src_port: u16, dst_port: u16, seq: u32) -> Self {
        Self {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            seq,
            ack: 0,
            flags: ResponseFlags(TcpFlags::SYN),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("raw socket access denied (SYN scanning requires root or CAP_NET_RAW)")]
    PermissionDenied,

    #[error("packet transport unavailable: {0}")]
    Unavailable(#[source] io::Error),

    #[error("failed to send segment: {0}")]
    Send(#[source] io::Error),

    #[error("packet transport closed")]
    Closed,

    #[error("unsupported address: {0}")]
    UnsupportedAddress(String),
}

impl TransportError {
    /// Classify an error raised while acquiring the raw socket.
    pub fn from_open(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => TransportError::PermissionDenied,
            _ if err.raw_os_error() == Some(1) => TransportError::PermissionDenied,
            _ => TransportError::Unavailable(err),
        }
    }
}

/// A shared packet channel to one target.
///
/// Implementations must tolerate concurrent `send` calls from many probe tasks
/// while a single receive pump drives `recv`.
#[async_trait]
pub trait PacketTransport: Send + Sync {
    /// Address stamped as the source of outgoing segments.
    fn local_ip(&self) -> Ipv4Addr;

    /// Transmit one segment.
    async fn send(&self, segment: &Segment) -> Result<(), TransportError>;

    /// Next inbound TCP segment. Returns `Closed` once no more segments can arrive.
    async fn recv(&self) -> Result<Segment, TransportError>;
}

/// Acquires a transport for a target. Failing here is fatal to the scan.
pub trait TransportFactory: Send + Sync {
    type Transport: PacketTransport + 'static;

    fn open(&self, target: Ipv4Addr) -> Result<Self::Transport, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_notation() {
        assert_eq!(ResponseFlags::SYN_ACK.to_string(), "SA");
        assert_eq!(ResponseFlags::RST_ACK.to_string(), "RA");
        assert_eq!(ResponseFlags(TcpFlags::FIN | TcpFlags::PSH | TcpFlags::URG).to_string(), "FPU");
        assert_eq!(ResponseFlags(0).to_string(), "none");
    }

    #[test]
    fn test_flag_predicates() {
        let flags = ResponseFlags::SYN_ACK;
        assert!(flags.syn());
        assert!(flags.ack());
        assert!(!flags.rst());
    }

    #[test]
    fn test_open_error_classification() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(TransportError::from_open(denied), TransportError::PermissionDenied));

        let eperm = io::Error::from_raw_os_error(1);
        assert!(matches!(TransportError::from_open(eperm), TransportError::PermissionDenied));

        let other = io::Error::new(io::ErrorKind::Other, "no device");
        assert!(matches!(TransportError::from_open(other), TransportError::Unavailable(_)));
    }

    #[test]
    fn test_flags_serialize_as_notation() {
        let json = serde_json::to_string(&ResponseFlags::SYN_ACK).unwrap();
        assert_eq!(json, "\"SA\"");
    }
}

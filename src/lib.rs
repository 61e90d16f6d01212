//! Half-open (SYN) TCP port scanning.
//!
//! A [`Scanner`] sends one SYN per port attempt through a [`PacketTransport`],
//! matches replies back to the probe that caused them, and classifies each
//! port as open, closed or filtered without ever completing a handshake.

pub mod cli;
pub mod config;
pub mod error;
pub mod output;
pub mod scanner;
pub mod transport;
pub mod utils;

pub use error::ScanError;
pub use scanner::{PortResult, PortVerdict, ScanOptions, ScanResult, Scanner, Target};
pub use transport::{PacketTransport, RawTransportFactory, TransportError, TransportFactory};

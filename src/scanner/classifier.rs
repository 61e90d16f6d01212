use pnet::packet::tcp::TcpFlags;

use super::probe::ProbeOutcome;
use super::results::PortVerdict;
use crate::transport::ResponseFlags;

/// ECN negotiation bits; they ride along on SYNs and never change a verdict.
const ECN_BITS: u8 = TcpFlags::ECE | TcpFlags::CWR;

/// Map a probe outcome to a port verdict.
///
/// RST wins over everything else, so a malformed SYN+RST reply is `Closed`.
/// A bare SYN without ACK counts as open, matching the SYN-ACK case. Any
/// other combination (SYN with FIN, lone ACK, empty flags) is `Filtered`.
pub fn classify(outcome: &ProbeOutcome) -> PortVerdict {
    match outcome {
        ProbeOutcome::Response { flags, .. } => classify_flags(*flags),
        ProbeOutcome::NoResponse { .. } => PortVerdict::Filtered,
    }
}

pub fn classify_flags(flags: ResponseFlags) -> PortVerdict {
    if flags.rst() {
        PortVerdict::Closed
    } else if flags.syn() && flags.ack() {
        PortVerdict::Open
    } else if flags.0 & !ECN_BITS == TcpFlags::SYN {
        PortVerdict::Open
    } else {
        PortVerdict::Filtered
    }
}

//! TCP header encoding and decoding on top of `pnet` packet views.

use std::net::Ipv4Addr;

use pnet::packet::tcp::{self, MutableTcpPacket, TcpPacket};
use pnet::packet::Packet;

use super::{ResponseFlags, Segment};

/// Length of an option-less TCP header.
pub const TCP_HEADER_LEN: usize = 20;

const WINDOW_SIZE: u16 = 64_240;

/// Serialize an outgoing segment into a TCP header with a valid checksum.
/// The IPv4 header is left to the kernel.
pub fn build_tcp_header(segment: &Segment) -> Vec<u8> {
    let mut buffer = vec![0u8; TCP_HEADER_LEN];
    if let Some(mut tcp) = MutableTcpPacket::new(&mut buffer) {
        tcp.set_source(segment.src_port);
        tcp.set_destination(segment.dst_port);
        tcp.set_sequence(segment.seq);
        tcp.set_acknowledgement(segment.ack);
        tcp.set_data_offset(5);
        tcp.set_flags(segment.flags.0);
        tcp.set_window(WINDOW_SIZE);
        tcp.set_urgent_ptr(0);

        let checksum = tcp::ipv4_checksum(&tcp.to_immutable(), &segment.src_ip, &segment.dst_ip);
        tcp.set_checksum(checksum);
    }
    buffer
}

/// Extract the correlation-relevant fields of an inbound TCP header.
///
/// Returns `None` when the data offset is below the minimum header length or
/// points past the end of the packet.
pub fn parse_segment(tcp: &TcpPacket<'_>, src_ip: Ipv4Addr, dst_ip: Ipv4Addr) -> Option<Segment> {
    let header_len = tcp.get_data_offset() as usize * 4;
    if header_len < TCP_HEADER_LEN || header_len > tcp.packet().len() {
        return None;
    }

    Some(Segment {
        src_ip,
        dst_ip,
        src_port: tcp.get_source(),
        dst_port: tcp.get_destination(),
        seq: tcp.get_sequence(),
        ack: tcp.get_acknowledgement(),
        flags: ResponseFlags(tcp.get_flags()),
    })
}
